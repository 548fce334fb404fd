//! Shared application state
//!
//! The composition root: every service is built once here from the pool,
//! which keeps the subscription/catalog/ledger/billing dependencies an
//! explicit graph instead of modules importing each other.

use sqlx::PgPool;
use webicast_billing::{CatalogService, InvoiceService, IssuanceService, SubscriptionService};

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub subscriptions: SubscriptionService,
    pub catalog: CatalogService,
    pub issuance: IssuanceService,
    pub invoices: InvoiceService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionService::new(pool.clone()),
            catalog: CatalogService::new(pool.clone()),
            issuance: IssuanceService::new(pool.clone()),
            invoices: InvoiceService::new(pool.clone()),
            pool,
        }
    }
}
