//! Billing routes

use axum::{extract::State, Json};
use webicast_shared::BillingRecord;

use crate::{auth::AuthOwner, error::ApiResult, state::AppState};

/// The caller's billing records, newest first
pub async fn billing_history(
    State(state): State<AppState>,
    AuthOwner(owner_id): AuthOwner,
) -> ApiResult<Json<Vec<BillingRecord>>> {
    let records = state.invoices.history(owner_id).await?;
    Ok(Json(records))
}
