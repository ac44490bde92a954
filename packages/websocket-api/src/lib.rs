use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use shared::clock::SystemClock;
use shared::config::DuelConfig;
use shared::repositories::connection_repository::InMemoryConnectionRepository;
use shared::repositories::game_end_repository::InMemoryGameEndRepository;
use shared::repositories::judge_repository::HttpJudgeRepository;
use shared::repositories::player_repository::InMemoryPlayerRepository;
use shared::repositories::question_repository::InMemoryQuestionRepository;
use shared::services::duel_service::{DuelCollaborators, DuelService};
use shared::services::rating_service::EloRatingCalculator;

pub mod actions;
pub mod routes;
pub mod state;

use state::AppState;

/// Wires the orchestrator against the HTTP judge and the process-local stores.
pub fn build_state(config: DuelConfig) -> AppState {
    let players = Arc::new(InMemoryPlayerRepository::new());
    let connections = Arc::new(InMemoryConnectionRepository::new());
    let duel_service = DuelService::new(
        config.clone(),
        DuelCollaborators {
            clock: Arc::new(SystemClock),
            judge: Arc::new(HttpJudgeRepository::new(&config.judge_base_url)),
            players: players.clone(),
            questions: Arc::new(InMemoryQuestionRepository::default()),
            game_ends: Arc::new(InMemoryGameEndRepository::new(Some(players.clone()))),
            connections: connections.clone(),
            rating: Arc::new(EloRatingCalculator::new(config.rating_k_factor)),
        },
    );

    AppState {
        duel_service,
        connections,
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws", get(routes::websocket::websocket_handler))
        .layer(cors)
        .with_state(state)
}

/// Periodic matchmaking pass so waiting tickets widen and expire without new arrivals.
pub fn spawn_matchmaking_ticker(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            debug!("Matchmaking tick");
            state.duel_service.run_matchmaking().await;
        }
    })
}
