use tracing::debug;

use shared::models::duel_session::PlayerActivity;

use crate::state::AppState;

pub async fn handle_ready(state: &AppState, player_id: &str, session_id: &str) {
    if let Err(e) = state.duel_service.mark_ready(player_id, session_id).await {
        debug!("Ready from {} rejected: {}", player_id, e);
        state.duel_service.reject(player_id, &e).await;
    }
}

pub async fn handle_player_status(
    state: &AppState,
    player_id: &str,
    session_id: &str,
    activity: PlayerActivity,
) {
    if let Err(e) = state
        .duel_service
        .player_status(player_id, session_id, activity)
        .await
    {
        state.duel_service.reject(player_id, &e).await;
    }
}

pub async fn handle_leave_game(state: &AppState, player_id: &str, session_id: &str) {
    if let Err(e) = state.duel_service.leave_game(player_id, session_id).await {
        debug!("Leave from {} rejected: {}", player_id, e);
        state.duel_service.reject(player_id, &e).await;
    }
}
