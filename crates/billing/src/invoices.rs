//! Billing recorder
//!
//! Persists immutable invoice lines. Callable inside the caller's
//! transaction so a grant and its billing record commit or abort together.

use rand::Rng;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use webicast_shared::{BillingRecord, BillingType};

use crate::error::{BillingError, BillingResult};

/// Alphabet for invoice numbers. Skips 0/O/1/I to keep codes readable on
/// printed statements.
const INVOICE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const INVOICE_CODE_LEN: usize = 8;
const MAX_INVOICE_ATTEMPTS: u32 = 5;

/// Generate a candidate invoice number. Uniqueness is enforced by the
/// caller's check-and-retry loop plus the column's unique constraint.
fn generate_invoice_number() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..INVOICE_CODE_LEN)
        .map(|_| INVOICE_ALPHABET[rng.gen_range(0..INVOICE_ALPHABET.len())] as char)
        .collect();
    format!("INV-{code}")
}

/// Service for recording and querying billing records
#[derive(Clone)]
pub struct InvoiceService {
    pool: PgPool,
}

impl InvoiceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a billing record inside the caller's transaction.
    ///
    /// The invoice number is checked for uniqueness before the insert: a
    /// unique violation mid-transaction would poison the surrounding
    /// transaction in Postgres, so the constraint only backstops candidates
    /// that race with a concurrent commit — that race aborts the whole
    /// transaction, which is the contract for issuance.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_in(
        &self,
        conn: &mut PgConnection,
        owner_id: Uuid,
        billing_type: BillingType,
        plan_id: Option<Uuid>,
        addon_definition_id: Option<Uuid>,
        item_amount_cents: i64,
        tax_amount_cents: i64,
        discount_amount_cents: i64,
    ) -> BillingResult<BillingRecord> {
        let amount_cents = item_amount_cents + tax_amount_cents - discount_amount_cents;

        let mut invoice_number = None;
        for _ in 0..MAX_INVOICE_ATTEMPTS {
            let candidate = generate_invoice_number();
            let (taken,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM billing_records WHERE invoice_number = $1)",
            )
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;

            if !taken {
                invoice_number = Some(candidate);
                break;
            }
            tracing::warn!(invoice_number = %candidate, "Invoice number collision, regenerating");
        }
        let invoice_number = invoice_number
            .ok_or(BillingError::InvoiceNumberExhausted(MAX_INVOICE_ATTEMPTS))?;

        let record: BillingRecord = sqlx::query_as(
            "INSERT INTO billing_records (
                owner_id, plan_id, addon_definition_id,
                item_amount_cents, tax_amount_cents, discount_amount_cents, amount_cents,
                invoice_number, billing_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, owner_id, plan_id, addon_definition_id,
                      item_amount_cents, tax_amount_cents, discount_amount_cents, amount_cents,
                      invoice_number, billing_type, created_at",
        )
        .bind(owner_id)
        .bind(plan_id)
        .bind(addon_definition_id)
        .bind(item_amount_cents)
        .bind(tax_amount_cents)
        .bind(discount_amount_cents)
        .bind(amount_cents)
        .bind(&invoice_number)
        .bind(billing_type)
        .fetch_one(&mut *conn)
        .await?;

        Ok(record)
    }

    /// List an owner's billing records, newest first
    pub async fn history(&self, owner_id: Uuid) -> BillingResult<Vec<BillingRecord>> {
        let records: Vec<BillingRecord> = sqlx::query_as(
            "SELECT id, owner_id, plan_id, addon_definition_id,
                    item_amount_cents, tax_amount_cents, discount_amount_cents, amount_cents,
                    invoice_number, billing_type, created_at
             FROM billing_records
             WHERE owner_id = $1
             ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
