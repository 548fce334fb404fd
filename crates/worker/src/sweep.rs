//! Scheduled sweeps
//!
//! Two jobs: the expiry sweep deletes lapsed grants (Postgres has no TTL
//! index; each delete fires the notify trigger that drives the watcher),
//! and the consistency sweep recomputes surplus capacity from the ledger to
//! correct drift from missed or duplicated deliveries.

use tracing::{error, info};
use webicast_billing::{CapacityReconciler, LedgerService};

/// Grants deleted per sweep run; keeps one run's notification burst bounded
const EXPIRY_SWEEP_BATCH: i64 = 500;

/// Delete lapsed grants from the ledger
pub async fn run_expiry_sweep(ledger: &LedgerService) {
    match ledger.delete_expired(EXPIRY_SWEEP_BATCH).await {
        Ok(0) => {}
        Ok(deleted) => {
            info!(deleted, "Expiry sweep removed lapsed grants");
        }
        Err(e) => {
            error!(error = %e, "Expiry sweep failed");
        }
    }
}

/// Recompute addon capacity from unexpired ledger rows
pub async fn run_consistency_sweep(reconciler: &CapacityReconciler) {
    match reconciler.sweep().await {
        Ok(corrections) if corrections.is_empty() => {}
        Ok(corrections) => {
            for correction in &corrections {
                info!(
                    subscription_id = %correction.subscription_id,
                    owner_id = %correction.owner_id,
                    employee_limit_addon = correction.employee_limit_addon,
                    contact_limit_addon = correction.contact_limit_addon,
                    "Consistency sweep corrected capacity"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Consistency sweep failed");
        }
    }
}
