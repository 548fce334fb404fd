//! Expiry watcher
//!
//! Long-lived listener on the entitlement ledger's delete feed. Started once
//! at process init and runs for the worker's lifetime. Each notification
//! carries the deleted grant's pre-image; the watcher hands it to the
//! reconciler, which decrements the owning subscription's surplus capacity.
//!
//! Failure handling: a single event that fails to parse or apply is logged
//! and dropped — the consistency sweep corrects it later. A transport
//! failure triggers reconnect with backoff. Postgres NOTIFY has no resume
//! position, so deletions committed while disconnected are also left to the
//! sweep.

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{error, info, warn};
use webicast_billing::{CapacityReconciler, GrantDeletedEvent, GRANT_DELETED_CHANNEL};

async fn connect(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(GRANT_DELETED_CHANNEL).await?;
    Ok(listener)
}

/// Run the watcher until the process shuts down
pub async fn run(pool: PgPool, reconciler: CapacityReconciler) {
    loop {
        let strategy = ExponentialBackoff::from_millis(500)
            .max_delay(Duration::from_secs(30))
            .map(jitter);

        let mut listener = match Retry::spawn(strategy, || connect(&pool)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to open grant feed, retrying");
                tokio::time::sleep(Duration::from_secs(30)).await;
                continue;
            }
        };

        info!(channel = GRANT_DELETED_CHANNEL, "Expiry watcher listening");

        loop {
            match listener.recv().await {
                Ok(notification) => handle_event(&reconciler, notification.payload()).await,
                Err(e) => {
                    warn!(error = %e, "Grant feed disconnected, reconnecting");
                    break;
                }
            }
        }
    }
}

/// Apply one deletion event. Never returns an error: a bad event must not
/// take down the listener.
async fn handle_event(reconciler: &CapacityReconciler, payload: &str) {
    let event: GrantDeletedEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, payload, "Unparseable grant deletion event, dropping");
            return;
        }
    };

    match reconciler
        .apply(event.subscription_id, event.addon_type, event.amount)
        .await
    {
        Ok(subscription) => {
            info!(
                grant_id = %event.id,
                subscription_id = %event.subscription_id,
                addon_type = %event.addon_type,
                amount = event.amount,
                employee_limit_addon = subscription.employee_limit_addon,
                contact_limit_addon = subscription.contact_limit_addon,
                "Expired grant reconciled"
            );
        }
        Err(e) => {
            // e.g. the subscription was removed with the tenant; the
            // consistency sweep owns whatever state remains
            error!(
                grant_id = %event.id,
                subscription_id = %event.subscription_id,
                error = %e,
                "Failed to reconcile expired grant, dropping event"
            );
        }
    }
}
