use anyhow::{Context, Result};
use axum::serve;
use bauxite_api::{build_router, AppState};
use bauxite_utils::{init_logging, AppConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        AppConfig::default()
    });

    init_logging(&config.logging)?;
    info!("Starting Bauxite Planning API");

    let repos = bauxite_database::initialize(&config.database)
        .await
        .context("Failed to initialize storage")?;
    info!(backend = ?repos.backend(), "Storage ready");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = build_router(AppState::new(config, repos)?);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API listening on {}", addr);

    serve(listener, app).await?;

    Ok(())
}
