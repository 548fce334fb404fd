//! Entitlement ledger
//!
//! Append/delete-only store of issued grants. Rows are inserted inside the
//! issuance transaction and removed either by the worker's expiry sweep or
//! by explicit deletion; either delete fires the
//! `entitlement_grant_deleted` trigger, which is the sole reconciliation
//! trigger.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;
use webicast_shared::{AddOnDefinition, AddonKind, EntitlementGrant};

use crate::error::{BillingError, BillingResult};

const GRANT_COLUMNS: &str =
    "id, subscription_id, addon_definition_id, addon_type, amount, expiry_date, created_at";

/// Per-kind sums of unexpired grant amounts for one subscription
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AddonTotals {
    pub employee_limit: i64,
    pub contact_limit: i64,
}

/// Store for the entitlement grant ledger
#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a grant inside the caller's transaction, copying the
    /// definition's type and amount so the row is self-contained at
    /// deletion time.
    pub async fn insert_in(
        &self,
        conn: &mut PgConnection,
        subscription_id: Uuid,
        definition: &AddOnDefinition,
        expiry_date: OffsetDateTime,
    ) -> BillingResult<EntitlementGrant> {
        let grant: EntitlementGrant = sqlx::query_as(&format!(
            "INSERT INTO entitlement_grants (
                subscription_id, addon_definition_id, addon_type, amount, expiry_date
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {GRANT_COLUMNS}"
        ))
        .bind(subscription_id)
        .bind(definition.id)
        .bind(definition.addon_type)
        .bind(definition.amount)
        .bind(expiry_date)
        .fetch_one(conn)
        .await?;

        Ok(grant)
    }

    /// All grants for a subscription, soonest expiry first
    pub async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> BillingResult<Vec<EntitlementGrant>> {
        let grants: Vec<EntitlementGrant> = sqlx::query_as(&format!(
            "SELECT {GRANT_COLUMNS} FROM entitlement_grants
             WHERE subscription_id = $1
             ORDER BY expiry_date ASC"
        ))
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }

    /// Sum unexpired grant amounts per kind for one subscription
    pub async fn unexpired_totals(&self, subscription_id: Uuid) -> BillingResult<AddonTotals> {
        let rows: Vec<(AddonKind, i64)> = sqlx::query_as(
            "SELECT addon_type, COALESCE(SUM(amount), 0)
             FROM entitlement_grants
             WHERE subscription_id = $1 AND expiry_date >= NOW()
             GROUP BY addon_type",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = AddonTotals::default();
        for (kind, sum) in rows {
            match kind {
                AddonKind::EmployeeLimit => totals.employee_limit = sum,
                AddonKind::ContactLimit => totals.contact_limit = sum,
            }
        }
        Ok(totals)
    }

    /// Delete lapsed grants in bounded batches. Each deleted row fires the
    /// pre-image notify trigger that drives reconciliation.
    pub async fn delete_expired(&self, batch_size: i64) -> BillingResult<u64> {
        let result = sqlx::query(
            "DELETE FROM entitlement_grants
             WHERE id IN (
                 SELECT id FROM entitlement_grants
                 WHERE expiry_date < NOW()
                 ORDER BY expiry_date ASC
                 LIMIT $1
             )",
        )
        .bind(batch_size)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Explicitly remove a grant before its expiry. Takes the same
    /// reconciliation path as the sweep.
    pub async fn delete(&self, grant_id: Uuid) -> BillingResult<()> {
        let result = sqlx::query("DELETE FROM entitlement_grants WHERE id = $1")
            .bind(grant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::GrantNotFound(grant_id.to_string()));
        }
        Ok(())
    }
}
