use tracing::info;

use crate::state::AppState;

pub async fn handle_connect(state: &AppState, player_id: &str, connection_id: &str) {
    if let Some(displaced) = state.duel_service.connect(player_id, connection_id).await {
        info!(
            "Connection {} of player {} displaced by {}",
            displaced, player_id, connection_id
        );
    }
}

pub async fn handle_disconnect(state: &AppState, player_id: &str, connection_id: &str) {
    info!(
        "Player {} disconnected from connection {}",
        player_id, connection_id
    );
    state.duel_service.disconnect(player_id, connection_id).await;
    state.connections.remove_connection(connection_id).await;
}
