//! Integration tests for the capacity add-on lifecycle
//!
//! Covers issuance atomicity, grant expiry capping, delete-triggered
//! reconciliation through the Postgres notify feed, and the consistency
//! sweep that corrects drift from duplicated deliveries.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/webicast_test"
//! cargo test -p webicast-billing -- --ignored --test-threads=1
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use webicast_billing::{
    BillingError, CapacityReconciler, GrantDeletedEvent, IssuanceService, LedgerService,
    SubscriptionService, GRANT_DELETED_CHANNEL,
};
use webicast_shared::{AddonKind, Subscription};

// ============================================================================
// Test Utilities
// ============================================================================

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    webicast_shared::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Create a plan and a subscription for a fresh owner, returning
/// (owner_id, subscription_id).
async fn create_test_subscription(pool: &PgPool, expiry: OffsetDateTime) -> (Uuid, Uuid) {
    let owner_id = Uuid::new_v4();

    let (plan_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO plans (name, price_cents, validity_days, contact_limit, employee_limit)
         VALUES ('Test Plan', 9900, 365, 1000, 10)
         RETURNING id",
    )
    .fetch_one(pool)
    .await
    .expect("Failed to create test plan");

    let (subscription_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO subscriptions (owner_id, plan_id, expiry_date, contact_limit, employee_limit)
         VALUES ($1, $2, $3, 1000, 10)
         RETURNING id",
    )
    .bind(owner_id)
    .bind(plan_id)
    .bind(expiry)
    .fetch_one(pool)
    .await
    .expect("Failed to create test subscription");

    (owner_id, subscription_id)
}

async fn create_test_addon(
    pool: &PgPool,
    kind: AddonKind,
    amount: i32,
    validity_days: i32,
) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO addon_definitions (name, addon_type, amount, price_cents, validity_days)
         VALUES ('Test Add-on', $1, $2, 2500, $3)
         RETURNING id",
    )
    .bind(kind)
    .bind(amount)
    .bind(validity_days)
    .fetch_one(pool)
    .await
    .expect("Failed to create test add-on definition");
    id
}

async fn fetch_subscription(pool: &PgPool, subscription_id: Uuid) -> Subscription {
    sqlx::query_as(
        "SELECT id, owner_id, plan_id, start_date, expiry_date, contact_limit, employee_limit,
                contact_limit_addon, employee_limit_addon, toggle_limit, created_at, updated_at
         FROM subscriptions WHERE id = $1",
    )
    .bind(subscription_id)
    .fetch_one(pool)
    .await
    .expect("Subscription should exist")
}

async fn count_rows(pool: &PgPool, table: &str, subscription_or_owner: &str, id: Uuid) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {table} WHERE {subscription_or_owner} = $1"
    ))
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("count query failed");
    count
}

// ============================================================================
// Issuance
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn grant_expiry_is_capped_at_subscription_expiry() {
    let pool = setup_pool().await;
    let sub_expiry = OffsetDateTime::now_utc() + Duration::days(9);
    let (owner_id, _) = create_test_subscription(&pool, sub_expiry).await;
    let addon_id = create_test_addon(&pool, AddonKind::ContactLimit, 500, 30).await;

    let issued = IssuanceService::new(pool.clone())
        .issue(owner_id, addon_id)
        .await
        .expect("issuance should succeed");

    assert_eq!(issued.grant.expiry_date, sub_expiry);
    assert!(issued.grant.expiry_date <= issued.subscription.expiry_date);
}

#[tokio::test]
#[ignore] // Requires database
async fn grant_expiry_uncapped_when_validity_is_shorter() {
    let pool = setup_pool().await;
    let sub_expiry = OffsetDateTime::now_utc() + Duration::days(150);
    let (owner_id, _) = create_test_subscription(&pool, sub_expiry).await;
    let addon_id = create_test_addon(&pool, AddonKind::ContactLimit, 500, 10).await;

    let before = OffsetDateTime::now_utc();
    let issued = IssuanceService::new(pool.clone())
        .issue(owner_id, addon_id)
        .await
        .expect("issuance should succeed");

    let lower = before + Duration::days(10);
    let upper = OffsetDateTime::now_utc() + Duration::days(10);
    assert!(issued.grant.expiry_date >= lower && issued.grant.expiry_date <= upper);
}

#[tokio::test]
#[ignore] // Requires database
async fn issuance_bumps_capacity_and_records_billing() {
    let pool = setup_pool().await;
    let (owner_id, subscription_id) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() + Duration::days(90)).await;
    let addon_id = create_test_addon(&pool, AddonKind::EmployeeLimit, 5, 30).await;

    let issued = IssuanceService::new(pool.clone())
        .issue(owner_id, addon_id)
        .await
        .expect("issuance should succeed");

    assert_eq!(issued.subscription.employee_limit_addon, 5);
    assert_eq!(issued.billing.amount_cents, 2500);
    assert!(issued.billing.invoice_number.starts_with("INV-"));
    assert_eq!(
        count_rows(&pool, "entitlement_grants", "subscription_id", subscription_id).await,
        1
    );
    assert_eq!(count_rows(&pool, "billing_records", "owner_id", owner_id).await, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn expired_subscription_is_rejected_with_no_side_effects() {
    let pool = setup_pool().await;
    let (owner_id, subscription_id) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() - Duration::days(1)).await;
    let addon_id = create_test_addon(&pool, AddonKind::ContactLimit, 500, 30).await;

    let result = IssuanceService::new(pool.clone())
        .issue(owner_id, addon_id)
        .await;

    assert!(matches!(result, Err(BillingError::SubscriptionExpired(_))));
    assert_eq!(
        count_rows(&pool, "entitlement_grants", "subscription_id", subscription_id).await,
        0
    );
    assert_eq!(count_rows(&pool, "billing_records", "owner_id", owner_id).await, 0);
}

#[tokio::test]
#[ignore] // Requires database
async fn unknown_owner_is_rejected_with_no_side_effects() {
    let pool = setup_pool().await;
    let owner_id = Uuid::new_v4();
    let addon_id = create_test_addon(&pool, AddonKind::ContactLimit, 500, 30).await;

    let result = IssuanceService::new(pool.clone())
        .issue(owner_id, addon_id)
        .await;

    assert!(matches!(result, Err(BillingError::SubscriptionNotFound(_))));
    assert_eq!(count_rows(&pool, "billing_records", "owner_id", owner_id).await, 0);
}

#[tokio::test]
#[ignore] // Requires database
async fn invoice_numbers_are_unique_across_purchases() {
    let pool = setup_pool().await;
    let (owner_id, _) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() + Duration::days(90)).await;
    let addon_id = create_test_addon(&pool, AddonKind::ContactLimit, 100, 30).await;

    let issuance = IssuanceService::new(pool.clone());
    let mut numbers = std::collections::HashSet::new();
    for _ in 0..5 {
        let issued = issuance
            .issue(owner_id, addon_id)
            .await
            .expect("issuance should succeed");
        assert!(numbers.insert(issued.billing.invoice_number));
    }
}

// ============================================================================
// Expiry feed and reconciliation
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn deleted_grant_preimage_reaches_listener_and_decrements() {
    let pool = setup_pool().await;
    let (owner_id, subscription_id) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() + Duration::days(90)).await;
    // 700 from a long-lived grant, 500 from one about to lapse
    let long_addon = create_test_addon(&pool, AddonKind::ContactLimit, 700, 60).await;
    let short_addon = create_test_addon(&pool, AddonKind::ContactLimit, 500, 30).await;

    let issuance = IssuanceService::new(pool.clone());
    issuance.issue(owner_id, long_addon).await.unwrap();
    let short = issuance.issue(owner_id, short_addon).await.unwrap();
    assert_eq!(short.subscription.contact_limit_addon, 1200);

    let mut listener = PgListener::connect_with(&pool).await.unwrap();
    listener.listen(GRANT_DELETED_CHANNEL).await.unwrap();

    // Backdate the short grant and run the sweep's delete path
    sqlx::query("UPDATE entitlement_grants SET expiry_date = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(short.grant.id)
        .execute(&pool)
        .await
        .unwrap();
    let deleted = LedgerService::new(pool.clone()).delete_expired(100).await.unwrap();
    assert_eq!(deleted, 1);

    let notification = tokio::time::timeout(std::time::Duration::from_secs(5), listener.recv())
        .await
        .expect("notification should arrive")
        .unwrap();
    let event: GrantDeletedEvent = serde_json::from_str(notification.payload()).unwrap();
    assert_eq!(event.id, short.grant.id);
    assert_eq!(event.subscription_id, subscription_id);
    assert_eq!(event.amount, 500);

    let after = CapacityReconciler::new(pool.clone())
        .apply(event.subscription_id, event.addon_type, event.amount)
        .await
        .unwrap();
    assert_eq!(after.contact_limit_addon, 700);
}

#[tokio::test]
#[ignore] // Requires database
async fn decrement_floors_at_zero_under_repeated_application() {
    let pool = setup_pool().await;
    let (owner_id, subscription_id) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() + Duration::days(90)).await;
    let addon_id = create_test_addon(&pool, AddonKind::EmployeeLimit, 5, 30).await;
    IssuanceService::new(pool.clone())
        .issue(owner_id, addon_id)
        .await
        .unwrap();

    let subscriptions = SubscriptionService::new(pool.clone());
    for _ in 0..3 {
        subscriptions
            .decrement_addon_capacity(subscription_id, AddonKind::EmployeeLimit, 5)
            .await
            .unwrap();
    }

    let sub = fetch_subscription(&pool, subscription_id).await;
    assert_eq!(sub.employee_limit_addon, 0);
}

#[tokio::test]
#[ignore] // Requires database
async fn duplicate_delivery_drift_is_corrected_by_sweep() {
    // The feed is at-least-once and apply() has no per-event guard; the
    // consistency sweep is what restores the ledger invariant.
    let pool = setup_pool().await;
    let (owner_id, subscription_id) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() + Duration::days(90)).await;
    let long_addon = create_test_addon(&pool, AddonKind::ContactLimit, 700, 60).await;
    let short_addon = create_test_addon(&pool, AddonKind::ContactLimit, 500, 30).await;

    let issuance = IssuanceService::new(pool.clone());
    issuance.issue(owner_id, long_addon).await.unwrap();
    let short = issuance.issue(owner_id, short_addon).await.unwrap();

    sqlx::query("DELETE FROM entitlement_grants WHERE id = $1")
        .bind(short.grant.id)
        .execute(&pool)
        .await
        .unwrap();

    let reconciler = CapacityReconciler::new(pool.clone());
    // First delivery lands correctly, the duplicate over-decrements
    reconciler
        .apply(subscription_id, AddonKind::ContactLimit, 500)
        .await
        .unwrap();
    let drifted = reconciler
        .apply(subscription_id, AddonKind::ContactLimit, 500)
        .await
        .unwrap();
    assert_eq!(drifted.contact_limit_addon, 200);

    let corrections = reconciler.sweep().await.unwrap();
    assert!(corrections
        .iter()
        .any(|c| c.subscription_id == subscription_id && c.contact_limit_addon == 700));
    let sub = fetch_subscription(&pool, subscription_id).await;
    assert_eq!(sub.contact_limit_addon, 700);
}

#[tokio::test]
#[ignore] // Requires database
async fn same_second_expiries_both_decrement_regardless_of_order() {
    let pool = setup_pool().await;
    let (owner_id, subscription_id) =
        create_test_subscription(&pool, OffsetDateTime::now_utc() + Duration::days(90)).await;
    let addon_300 = create_test_addon(&pool, AddonKind::ContactLimit, 300, 30).await;
    let addon_200 = create_test_addon(&pool, AddonKind::ContactLimit, 200, 30).await;

    let issuance = IssuanceService::new(pool.clone());
    issuance.issue(owner_id, addon_300).await.unwrap();
    issuance.issue(owner_id, addon_200).await.unwrap();
    assert_eq!(
        fetch_subscription(&pool, subscription_id).await.contact_limit_addon,
        500
    );

    let reconciler = CapacityReconciler::new(pool.clone());
    // Arrival order is not guaranteed by the feed; either order must settle
    // to the same final state.
    reconciler
        .apply(subscription_id, AddonKind::ContactLimit, 200)
        .await
        .unwrap();
    reconciler
        .apply(subscription_id, AddonKind::ContactLimit, 300)
        .await
        .unwrap();

    let sub = fetch_subscription(&pool, subscription_id).await;
    assert_eq!(sub.contact_limit_addon, 0);
}
