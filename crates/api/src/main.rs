//! Webicast API server

use tracing_subscriber::EnvFilter;
use webicast_api::{routes::create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool =
        webicast_shared::create_pool(&config.database_url, config.database_max_connections).await?;
    webicast_shared::run_migrations(&pool).await?;

    let state = AppState::new(pool);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "Webicast API listening");

    axum::serve(listener, app).await?;
    Ok(())
}
