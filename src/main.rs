use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sms_autopilot::api::{routes::create_router, state::AppState};
use sms_autopilot::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before anything reads it
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    // Create application state
    let state = Arc::new(AppState::new(&config)?);
    tracing::info!("Automation: {}", state.autopilot.config_summary());
    tracing::info!("Evidence directory: {}", config.evidence_dir.display());

    // Build router
    let app = create_router(state, &config.cors_origins);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("SMS autopilot starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
