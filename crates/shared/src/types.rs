//! Common domain types used across Webicast

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// The capacity dimension an add-on grants against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AddonKind {
    /// Supplemental employee seats
    EmployeeLimit,
    /// Supplemental contact records
    ContactLimit,
}

impl AddonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmployeeLimit => "employee_limit",
            Self::ContactLimit => "contact_limit",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "employee_limit" => Some(Self::EmployeeLimit),
            "contact_limit" => Some(Self::ContactLimit),
            _ => None,
        }
    }

    /// The subscription column this kind accumulates into.
    pub fn addon_column(&self) -> &'static str {
        match self {
            Self::EmployeeLimit => "employee_limit_addon",
            Self::ContactLimit => "contact_limit_addon",
        }
    }
}

impl std::fmt::Display for AddonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a billing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    NewPlan,
    AddOn,
    Renewal,
}

impl BillingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewPlan => "new_plan",
            Self::AddOn => "add_on",
            Self::Renewal => "renewal",
        }
    }
}

impl std::fmt::Display for BillingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Base plan referenced by subscriptions. Read-only catalog row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub validity_days: i32,
    pub contact_limit: i32,
    pub employee_limit: i32,
    pub toggle_limit: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Purchasable capacity grant definition. Immutable once referenced by a
/// grant; issuance copies `amount` onto the grant row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AddOnDefinition {
    pub id: Uuid,
    pub name: String,
    pub addon_type: AddonKind,
    pub amount: i32,
    pub price_cents: i64,
    pub validity_days: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tenant state
// =============================================================================

/// Tenant-scoped subscription singleton.
///
/// `contact_limit_addon` and `employee_limit_addon` are derived: once all
/// in-flight reconciliations settle they equal the sum of unexpired grant
/// amounts of the matching type. Never negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_date: OffsetDateTime,
    pub contact_limit: i32,
    pub employee_limit: i32,
    pub contact_limit_addon: i32,
    pub employee_limit_addon: i32,
    pub toggle_limit: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Effective seat capacity including unexpired grants.
    pub fn effective_employee_limit(&self) -> i64 {
        i64::from(self.employee_limit) + i64::from(self.employee_limit_addon)
    }

    /// Effective contact capacity including unexpired grants.
    pub fn effective_contact_limit(&self) -> i64 {
        i64::from(self.contact_limit) + i64::from(self.contact_limit_addon)
    }
}

/// A row in the entitlement ledger: one issued, time-bounded capacity grant.
/// Created once, never updated; removal is the sole reconciliation trigger.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntitlementGrant {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub addon_definition_id: Uuid,
    pub addon_type: AddonKind,
    pub amount: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Billing
// =============================================================================

/// Immutable invoice line. `invoice_number` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub addon_definition_id: Option<Uuid>,
    pub item_amount_cents: i64,
    pub tax_amount_cents: i64,
    pub discount_amount_cents: i64,
    pub amount_cents: i64,
    pub invoice_number: String,
    pub billing_type: BillingType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
