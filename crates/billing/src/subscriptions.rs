//! Subscription store
//!
//! Owns the tenant's base subscription aggregate: plan reference, base
//! limits, expiry, and the addon-derived surplus columns. The surplus
//! columns are the only fields touched by both the renewal/billing path and
//! the reconciliation path; every mutation here is a single-row atomic
//! update, so no application-level lock is needed.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use webicast_shared::{AddonKind, BillingRecord, BillingType, Plan, Subscription};

use crate::error::{BillingError, BillingResult};
use crate::invoices::InvoiceService;

const SUBSCRIPTION_COLUMNS: &str = "id, owner_id, plan_id, start_date, expiry_date, \
     contact_limit, employee_limit, contact_limit_addon, employee_limit_addon, \
     toggle_limit, created_at, updated_at";

/// A subscription joined with its plan, for the read endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionWithPlan {
    pub subscription: Subscription,
    pub plan: Plan,
}

/// Result of a renewal: the extended subscription plus its billing record
#[derive(Debug, Clone, Serialize)]
pub struct RenewedSubscription {
    pub subscription: Subscription,
    pub billing: BillingRecord,
}

/// Store for the tenant subscription aggregate
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether the subscription's paid period has lapsed
    pub fn is_expired(subscription: &Subscription) -> bool {
        subscription.expiry_date < OffsetDateTime::now_utc()
    }

    /// Fetch the owner's subscription
    pub async fn get_active(&self, owner_id: Uuid) -> BillingResult<Subscription> {
        let subscription: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE owner_id = $1"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        subscription.ok_or_else(|| BillingError::SubscriptionNotFound(owner_id.to_string()))
    }

    /// Fetch the owner's subscription joined with its plan
    pub async fn get_with_plan(&self, owner_id: Uuid) -> BillingResult<SubscriptionWithPlan> {
        let subscription = self.get_active(owner_id).await?;

        let plan: Option<Plan> = sqlx::query_as(
            "SELECT id, name, price_cents, validity_days, contact_limit, employee_limit,
                    toggle_limit, created_at
             FROM plans
             WHERE id = $1",
        )
        .bind(subscription.plan_id)
        .fetch_optional(&self.pool)
        .await?;

        let plan =
            plan.ok_or_else(|| BillingError::PlanNotFound(subscription.plan_id.to_string()))?;

        Ok(SubscriptionWithPlan { subscription, plan })
    }

    /// Re-read a subscription under `FOR UPDATE` inside the caller's
    /// transaction. Issuance uses this to re-validate expiry against
    /// concurrent renewals.
    pub async fn lock_for_update(
        &self,
        conn: &mut PgConnection,
        subscription_id: Uuid,
    ) -> BillingResult<Subscription> {
        let subscription: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(subscription_id)
        .fetch_optional(conn)
        .await?;

        subscription.ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    /// Add a freshly issued grant's amount to the matching surplus column,
    /// inside the issuance transaction.
    pub async fn bump_addon_capacity(
        &self,
        conn: &mut PgConnection,
        subscription_id: Uuid,
        kind: AddonKind,
        amount: i32,
    ) -> BillingResult<Subscription> {
        let sql = match kind {
            AddonKind::EmployeeLimit => format!(
                "UPDATE subscriptions
                 SET employee_limit_addon = employee_limit_addon + $2, updated_at = NOW()
                 WHERE id = $1
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            ),
            AddonKind::ContactLimit => format!(
                "UPDATE subscriptions
                 SET contact_limit_addon = contact_limit_addon + $2, updated_at = NOW()
                 WHERE id = $1
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            ),
        };

        let subscription: Option<Subscription> = sqlx::query_as(&sql)
            .bind(subscription_id)
            .bind(amount)
            .fetch_optional(conn)
            .await?;

        subscription.ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    /// Subtract an expired grant's amount from the matching surplus column,
    /// floored at zero. Single-row atomic update; safe to race with renewals.
    pub async fn decrement_addon_capacity(
        &self,
        subscription_id: Uuid,
        kind: AddonKind,
        amount: i32,
    ) -> BillingResult<Subscription> {
        let sql = match kind {
            AddonKind::EmployeeLimit => format!(
                "UPDATE subscriptions
                 SET employee_limit_addon = GREATEST(employee_limit_addon - $2, 0),
                     updated_at = NOW()
                 WHERE id = $1
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            ),
            AddonKind::ContactLimit => format!(
                "UPDATE subscriptions
                 SET contact_limit_addon = GREATEST(contact_limit_addon - $2, 0),
                     updated_at = NOW()
                 WHERE id = $1
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            ),
        };

        let subscription: Option<Subscription> = sqlx::query_as(&sql)
            .bind(subscription_id)
            .bind(amount)
            .fetch_optional(&self.pool)
            .await?;

        subscription.ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    /// Renew the owner's subscription: extend the expiry by the plan's
    /// validity period and record a renewal billing line, atomically.
    ///
    /// A lapsed subscription renews from now; an unexpired one extends from
    /// its current expiry, so renewing early never loses paid time.
    pub async fn renew(
        &self,
        owner_id: Uuid,
        invoices: &InvoiceService,
    ) -> BillingResult<RenewedSubscription> {
        let current = self.get_active(owner_id).await?;

        let plan: Option<Plan> = sqlx::query_as(
            "SELECT id, name, price_cents, validity_days, contact_limit, employee_limit,
                    toggle_limit, created_at
             FROM plans
             WHERE id = $1",
        )
        .bind(current.plan_id)
        .fetch_optional(&self.pool)
        .await?;
        let plan = plan.ok_or_else(|| BillingError::PlanNotFound(current.plan_id.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let locked = self.lock_for_update(&mut tx, current.id).await?;
        let renew_from = locked.expiry_date.max(OffsetDateTime::now_utc());
        let new_expiry = renew_from + Duration::days(i64::from(plan.validity_days));

        let subscription: Subscription = sqlx::query_as(&format!(
            "UPDATE subscriptions
             SET expiry_date = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(locked.id)
        .bind(new_expiry)
        .fetch_one(&mut *tx)
        .await?;

        let billing = invoices
            .record_in(
                &mut tx,
                owner_id,
                BillingType::Renewal,
                Some(plan.id),
                None,
                plan.price_cents,
                0,
                0,
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            owner_id = %owner_id,
            subscription_id = %subscription.id,
            new_expiry = %subscription.expiry_date,
            invoice_number = %billing.invoice_number,
            "Renewed subscription"
        );

        Ok(RenewedSubscription {
            subscription,
            billing,
        })
    }
}
