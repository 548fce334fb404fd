//! Add-on catalog access
//!
//! Read-only definitions of purchasable capacity grants. Definitions are
//! treated as immutable once referenced by a grant; issuance copies the
//! amount onto the grant row rather than re-reading the catalog later.

use sqlx::PgPool;
use uuid::Uuid;
use webicast_shared::AddOnDefinition;

use crate::error::{BillingError, BillingResult};

/// Catalog of purchasable add-on definitions
#[derive(Clone)]
pub struct CatalogService {
    pool: PgPool,
}

impl CatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a single definition by id
    pub async fn get(&self, addon_id: Uuid) -> BillingResult<AddOnDefinition> {
        let definition: Option<AddOnDefinition> = sqlx::query_as(
            "SELECT id, name, addon_type, amount, price_cents, validity_days, created_at
             FROM addon_definitions
             WHERE id = $1",
        )
        .bind(addon_id)
        .fetch_optional(&self.pool)
        .await?;

        definition.ok_or_else(|| BillingError::AddonNotFound(addon_id.to_string()))
    }

    /// List all purchasable definitions, cheapest first
    pub async fn list(&self) -> BillingResult<Vec<AddOnDefinition>> {
        let definitions: Vec<AddOnDefinition> = sqlx::query_as(
            "SELECT id, name, addon_type, amount, price_cents, validity_days, created_at
             FROM addon_definitions
             ORDER BY price_cents ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(definitions)
    }
}
