//! Webicast Billing and Entitlements
//!
//! Owns the capacity add-on core: the subscription store, the add-on catalog,
//! the entitlement ledger, atomic issuance of grants with their billing
//! records, and reconciliation of addon-derived capacity once grants lapse.
//!
//! The components form an explicit dependency graph built once at startup:
//! stores at the leaves, [`issuance::IssuanceService`] orchestrating purchases
//! on top, [`reconcile::CapacityReconciler`] applying the ledger's delete
//! feed back onto subscriptions.

pub mod catalog;
pub mod error;
pub mod invoices;
pub mod issuance;
pub mod ledger;
pub mod reconcile;
pub mod subscriptions;

pub use catalog::CatalogService;
pub use error::{BillingError, BillingResult};
pub use invoices::InvoiceService;
pub use issuance::{IssuanceService, IssuedAddon};
pub use ledger::{AddonTotals, LedgerService};
pub use reconcile::{CapacityCorrection, CapacityReconciler, GrantDeletedEvent, GRANT_DELETED_CHANNEL};
pub use subscriptions::{RenewedSubscription, SubscriptionService, SubscriptionWithPlan};
