//! API Server Binary Entry Point

use anyhow::Context;
use idverify::config::Settings;
use idverify_api::{start_server, ApiState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idverify_api=info,idverify=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let config = std::env::var("IDVERIFY_CONFIG").ok().map(PathBuf::from);

    let settings = Settings::load(config.as_deref()).context("Failed to load settings")?;
    let state = ApiState::from_settings(&settings).context("Failed to build API state")?;

    tracing::info!("Starting ID verification API server");
    start_server(&addr, state)
        .await
        .with_context(|| format!("Server on {addr} failed"))?;

    Ok(())
}
