//! Capacity reconciliation
//!
//! Applies an expired grant's effect back onto the owning subscription.
//! [`CapacityReconciler::apply`] is driven by the ledger's delete feed and
//! is deliberately a plain decrement: Postgres NOTIFY is at-least-once and
//! non-durable, so per-event idempotency is not attempted. Convergence is
//! guaranteed by [`CapacityReconciler::sweep`], which recomputes the surplus
//! columns straight from unexpired ledger rows and corrects any drift from
//! duplicated or missed events.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use webicast_shared::{AddonKind, Subscription};

use crate::error::BillingResult;
use crate::subscriptions::SubscriptionService;

/// Channel the ledger's delete trigger publishes pre-images on
pub const GRANT_DELETED_CHANNEL: &str = "entitlement_grant_deleted";

/// Pre-image of a deleted ledger row, as published by the
/// `entitlement_grant_deleted` trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantDeletedEvent {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub addon_type: AddonKind,
    pub amount: i32,
}

/// One subscription fixed by the consistency sweep
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CapacityCorrection {
    pub subscription_id: Uuid,
    pub owner_id: Uuid,
    pub employee_limit_addon: i32,
    pub contact_limit_addon: i32,
}

/// Applies ledger deletions back onto subscription capacity
#[derive(Clone)]
pub struct CapacityReconciler {
    pool: PgPool,
    subscriptions: SubscriptionService,
}

impl CapacityReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionService::new(pool.clone()),
            pool,
        }
    }

    /// Decrement the matching surplus column by the expired grant's amount,
    /// floored at zero. Not idempotent per event; see the module docs.
    pub async fn apply(
        &self,
        subscription_id: Uuid,
        kind: AddonKind,
        amount: i32,
    ) -> BillingResult<Subscription> {
        let subscription = self
            .subscriptions
            .decrement_addon_capacity(subscription_id, kind, amount)
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            addon_type = %kind,
            amount = amount,
            employee_limit_addon = subscription.employee_limit_addon,
            contact_limit_addon = subscription.contact_limit_addon,
            "Reconciled expired grant"
        );

        Ok(subscription)
    }

    /// Recompute both surplus columns for every subscription from unexpired
    /// ledger rows, fixing drift in one statement. Returns the rows that
    /// changed so callers can log them.
    pub async fn sweep(&self) -> BillingResult<Vec<CapacityCorrection>> {
        let corrections: Vec<CapacityCorrection> = sqlx::query_as(
            r#"
            WITH totals AS (
                SELECT s.id,
                       COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'employee_limit'), 0)::INT AS employee_total,
                       COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'contact_limit'), 0)::INT AS contact_total
                FROM subscriptions s
                LEFT JOIN entitlement_grants g
                  ON g.subscription_id = s.id AND g.expiry_date >= NOW()
                GROUP BY s.id
            )
            UPDATE subscriptions s
            SET employee_limit_addon = t.employee_total,
                contact_limit_addon = t.contact_total,
                updated_at = NOW()
            FROM totals t
            WHERE s.id = t.id
              AND (s.employee_limit_addon <> t.employee_total
                   OR s.contact_limit_addon <> t.contact_total)
            RETURNING s.id AS subscription_id, s.owner_id,
                      s.employee_limit_addon, s.contact_limit_addon
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if !corrections.is_empty() {
            tracing::warn!(
                corrected = corrections.len(),
                "Capacity sweep fixed drifted subscriptions"
            );
        }

        Ok(corrections)
    }
}
