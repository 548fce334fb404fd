//! Subscription and add-on routes
//!
//! The purchase endpoint is the entry into the issuance core: one request,
//! one transaction, and a `{subscription, billing, grant}` triple on
//! success. Expiry enforcement for issued grants is asynchronous and never
//! surfaces here.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use webicast_billing::{IssuedAddon, RenewedSubscription, SubscriptionWithPlan};
use webicast_shared::AddOnDefinition;

use crate::{auth::AuthOwner, error::ApiResult, state::AppState};

/// Current subscription joined with its plan
pub async fn get_subscription(
    State(state): State<AppState>,
    AuthOwner(owner_id): AuthOwner,
) -> ApiResult<Json<SubscriptionWithPlan>> {
    let subscription = state.subscriptions.get_with_plan(owner_id).await?;
    Ok(Json(subscription))
}

/// List purchasable add-on definitions
pub async fn list_addon_catalog(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AddOnDefinition>>> {
    let definitions = state.catalog.list().await?;
    Ok(Json(definitions))
}

/// Purchase a capacity add-on for the caller's subscription
pub async fn purchase_addon(
    State(state): State<AppState>,
    AuthOwner(owner_id): AuthOwner,
    Path(addon_id): Path<Uuid>,
) -> ApiResult<Json<IssuedAddon>> {
    let issued = state.issuance.issue(owner_id, addon_id).await?;
    Ok(Json(issued))
}

/// Renew the caller's subscription for another plan period
pub async fn renew_subscription(
    State(state): State<AppState>,
    AuthOwner(owner_id): AuthOwner,
) -> ApiResult<Json<RenewedSubscription>> {
    let renewed = state
        .subscriptions
        .renew(owner_id, &state.invoices)
        .await?;
    Ok(Json(renewed))
}
