//! Webicast background worker
//!
//! Hosts the long-lived expiry watcher plus the scheduled ledger sweeps.
//! The watcher reacts to grant deletions; the sweeps produce those
//! deletions and backstop the watcher's non-durable feed.

mod expiry_watcher;
mod sweep;

use std::env;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;
use webicast_billing::{CapacityReconciler, LedgerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL")?;
    let max_connections: u32 = env::var("DATABASE_MAX_CONNECTIONS")
        .unwrap_or_else(|_| "5".to_string())
        .parse()
        .unwrap_or(5);
    let expiry_cron =
        env::var("EXPIRY_SWEEP_CRON").unwrap_or_else(|_| "0 * * * * *".to_string());
    let consistency_cron =
        env::var("CONSISTENCY_SWEEP_CRON").unwrap_or_else(|_| "0 */10 * * * *".to_string());

    let pool = webicast_shared::create_pool(&database_url, max_connections).await?;

    let ledger = LedgerService::new(pool.clone());
    let reconciler = CapacityReconciler::new(pool.clone());

    // The watcher must be listening before the first sweep deletes anything
    let watcher = tokio::spawn(expiry_watcher::run(pool.clone(), reconciler.clone()));

    let scheduler = JobScheduler::new().await?;

    let sweep_ledger = ledger.clone();
    scheduler
        .add(Job::new_async(expiry_cron.as_str(), move |_id, _sched| {
            let ledger = sweep_ledger.clone();
            Box::pin(async move {
                sweep::run_expiry_sweep(&ledger).await;
            })
        })?)
        .await?;

    let sweep_reconciler = reconciler.clone();
    scheduler
        .add(Job::new_async(
            consistency_cron.as_str(),
            move |_id, _sched| {
                let reconciler = sweep_reconciler.clone();
                Box::pin(async move {
                    sweep::run_consistency_sweep(&reconciler).await;
                })
            },
        )?)
        .await?;

    scheduler.start().await?;
    info!(
        expiry_cron = %expiry_cron,
        consistency_cron = %consistency_cron,
        "Webicast worker started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down worker");
    watcher.abort();
    Ok(())
}
