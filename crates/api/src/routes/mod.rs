//! API routes

pub mod billing;
pub mod health;
pub mod subscription;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_v1 = Router::new()
        .route("/subscription", get(subscription::get_subscription))
        .route("/subscription/renew", post(subscription::renew_subscription))
        .route("/subscription/addons", get(subscription::list_addon_catalog))
        .route(
            "/subscription/addons/:addon_id",
            post(subscription::purchase_addon),
        )
        .route("/billing/history", get(billing::billing_history));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
