//! Add-on issuance
//!
//! Orchestrates a purchase: validate the subscription and definition,
//! compute the grant's expiry, then persist the grant, its billing record,
//! and the capacity bump in one transaction. Any failure aborts the whole
//! transaction; partial writes are never visible.

use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use webicast_shared::{BillingRecord, BillingType, EntitlementGrant, Subscription};

use crate::catalog::CatalogService;
use crate::error::{BillingError, BillingResult};
use crate::invoices::InvoiceService;
use crate::ledger::LedgerService;
use crate::subscriptions::SubscriptionService;

/// Everything a successful purchase produced
#[derive(Debug, Clone, Serialize)]
pub struct IssuedAddon {
    pub subscription: Subscription,
    pub billing: BillingRecord,
    pub grant: EntitlementGrant,
}

/// A grant never outlives its parent subscription: the computed expiry is
/// capped at the subscription's own expiry date.
pub fn grant_expiry(
    now: OffsetDateTime,
    validity_days: i32,
    subscription_expiry: OffsetDateTime,
) -> OffsetDateTime {
    (now + Duration::days(i64::from(validity_days))).min(subscription_expiry)
}

/// Coordinates add-on purchases
#[derive(Clone)]
pub struct IssuanceService {
    pool: PgPool,
    subscriptions: SubscriptionService,
    catalog: CatalogService,
    ledger: LedgerService,
    invoices: InvoiceService,
}

impl IssuanceService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionService::new(pool.clone()),
            catalog: CatalogService::new(pool.clone()),
            ledger: LedgerService::new(pool.clone()),
            invoices: InvoiceService::new(pool.clone()),
            pool,
        }
    }

    /// Purchase an add-on for the owner's subscription.
    pub async fn issue(&self, owner_id: Uuid, addon_id: Uuid) -> BillingResult<IssuedAddon> {
        // Validate outside the transaction first so the common rejections
        // (missing subscription, lapsed subscription, unknown add-on) never
        // open one.
        let subscription = self.subscriptions.get_active(owner_id).await?;
        if SubscriptionService::is_expired(&subscription) {
            return Err(BillingError::SubscriptionExpired(format!(
                "subscription for owner {owner_id} expired on {}",
                subscription.expiry_date
            )));
        }

        let definition = self.catalog.get(addon_id).await?;
        if definition.amount <= 0 {
            return Err(BillingError::InvalidInput(format!(
                "add-on {} has non-positive amount {}",
                definition.id, definition.amount
            )));
        }
        if definition.validity_days <= 0 {
            return Err(BillingError::InvalidInput(format!(
                "add-on {} has non-positive validity {}",
                definition.id, definition.validity_days
            )));
        }

        let mut tx = self.pool.begin().await?;

        // Re-validate under the row lock: a concurrent renewal may have
        // moved expiry_date, and a concurrent issuance holds this lock.
        let locked = self
            .subscriptions
            .lock_for_update(&mut tx, subscription.id)
            .await?;
        if SubscriptionService::is_expired(&locked) {
            return Err(BillingError::SubscriptionExpired(format!(
                "subscription for owner {owner_id} expired on {}",
                locked.expiry_date
            )));
        }

        let expiry = grant_expiry(
            OffsetDateTime::now_utc(),
            definition.validity_days,
            locked.expiry_date,
        );

        let grant = self
            .ledger
            .insert_in(&mut tx, locked.id, &definition, expiry)
            .await?;

        let billing = self
            .invoices
            .record_in(
                &mut tx,
                owner_id,
                BillingType::AddOn,
                None,
                Some(definition.id),
                definition.price_cents,
                0,
                0,
            )
            .await?;

        // The grant is live immediately; the surplus column carries it
        // until the expiry feed decrements it back out.
        let subscription = self
            .subscriptions
            .bump_addon_capacity(&mut tx, locked.id, definition.addon_type, definition.amount)
            .await?;

        tx.commit().await?;

        tracing::info!(
            owner_id = %owner_id,
            subscription_id = %subscription.id,
            addon_id = %definition.id,
            addon_type = %definition.addon_type,
            amount = definition.amount,
            grant_id = %grant.id,
            grant_expiry = %grant.expiry_date,
            invoice_number = %billing.invoice_number,
            "Issued capacity add-on"
        );

        Ok(IssuedAddon {
            subscription,
            billing,
            grant,
        })
    }
}
