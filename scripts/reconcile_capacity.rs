#!/usr/bin/env rust-script
//! Capacity Reconciliation Script
//!
//! Fixes drift between subscriptions' addon capacity columns and the
//! entitlement ledger. The ledger is the source of truth: a subscription's
//! addon columns must equal the sum of its unexpired grant amounts.
//!
//! ## Usage
//! ```bash
//! # Dry run (preview changes without applying)
//! cargo run --bin reconcile_capacity --dry-run
//!
//! # Apply fixes
//! cargo run --bin reconcile_capacity --apply
//! ```
//!
//! ## Environment Variables
//! - DATABASE_URL: PostgreSQL connection string

use std::env;
use std::error::Error;

#[derive(Debug)]
struct ReconciliationAction {
    subscription_id: uuid::Uuid,
    owner_id: uuid::Uuid,
    current_state: String,
    new_state: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("Webicast Capacity Reconciliation");
    println!("================================\n");

    let args: Vec<String> = env::args().collect();
    let dry_run = !args.contains(&"--apply".to_string());

    if dry_run {
        println!("DRY RUN MODE - No changes will be applied");
        println!("Use --apply flag to execute changes\n");
    } else {
        println!("LIVE MODE - Changes will be applied to the database\n");
    }

    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = sqlx::postgres::PgPool::connect(&database_url).await?;
    println!("Connected to database\n");

    println!("Scanning for subscriptions whose addon capacity drifted from the ledger...");

    let drifted: Vec<(uuid::Uuid, uuid::Uuid, i32, i32, i32, i32)> = sqlx::query_as(
        r#"
        SELECT s.id, s.owner_id,
               s.employee_limit_addon, s.contact_limit_addon,
               COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'employee_limit'), 0)::INT,
               COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'contact_limit'), 0)::INT
        FROM subscriptions s
        LEFT JOIN entitlement_grants g
          ON g.subscription_id = s.id AND g.expiry_date >= NOW()
        GROUP BY s.id
        HAVING s.employee_limit_addon <> COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'employee_limit'), 0)
            OR s.contact_limit_addon <> COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'contact_limit'), 0)
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let actions: Vec<ReconciliationAction> = drifted
        .into_iter()
        .map(
            |(subscription_id, owner_id, employee_now, contact_now, employee_want, contact_want)| {
                ReconciliationAction {
                    subscription_id,
                    owner_id,
                    current_state: format!("employee={employee_now} contact={contact_now}"),
                    new_state: format!("employee={employee_want} contact={contact_want}"),
                }
            },
        )
        .collect();

    println!("  Found {} subscriptions to fix\n", actions.len());

    if actions.is_empty() {
        println!("No reconciliation actions needed!");
        return Ok(());
    }

    println!("========================================");
    println!("Reconciliation Plan");
    println!("========================================\n");

    for (i, action) in actions.iter().enumerate() {
        println!("{}. Subscription {}", i + 1, action.subscription_id);
        println!("   Owner: {}", action.owner_id);
        println!("   Current: {}", action.current_state);
        println!("   New: {}", action.new_state);
        println!();
    }

    if dry_run {
        println!("This was a dry run. No changes were applied.");
        println!("Run with --apply flag to execute these changes.");
        return Ok(());
    }

    println!("========================================");
    println!("Executing Reconciliation");
    println!("========================================\n");

    for action in &actions {
        sqlx::query(
            r#"
            UPDATE subscriptions s
            SET employee_limit_addon = t.employee_total,
                contact_limit_addon = t.contact_total,
                updated_at = NOW()
            FROM (
                SELECT COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'employee_limit'), 0)::INT AS employee_total,
                       COALESCE(SUM(g.amount) FILTER (WHERE g.addon_type = 'contact_limit'), 0)::INT AS contact_total
                FROM entitlement_grants g
                WHERE g.subscription_id = $1 AND g.expiry_date >= NOW()
            ) t
            WHERE s.id = $1
            "#,
        )
        .bind(action.subscription_id)
        .execute(&pool)
        .await?;

        println!("  Fixed subscription {}", action.subscription_id);
    }

    println!("\n========================================");
    println!("Reconciliation Complete");
    println!("========================================");
    println!("Applied {} actions successfully", actions.len());

    Ok(())
}
