//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Subscription expired: {0}")]
    SubscriptionExpired(String),

    #[error("Add-on definition not found: {0}")]
    AddonNotFound(String),

    #[error("Grant not found: {0}")]
    GrantNotFound(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invoice number generation exhausted after {0} attempts")]
    InvoiceNumberExhausted(u32),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
