use std::str::FromStr;

use tracing::{error, info};

use shared::config::DuelConfig;
use websocket_api::{app, build_state, spawn_matchmaking_ticker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = DuelConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from_str(&config.log_level).unwrap_or(tracing::Level::INFO))
        .init();

    let state = build_state(config.clone());
    let ticker = spawn_matchmaking_ticker(state.clone(), config.queue_tick);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Duel gateway listening on {}", config.bind_addr);

    let service = state.duel_service.clone();
    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received, draining sessions");
            service.shutdown().await;
        })
        .await;

    ticker.abort();
    result?;
    Ok(())
}
