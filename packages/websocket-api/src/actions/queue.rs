use tracing::{debug, error};

use shared::models::matchmaking::QueuePreferences;
use shared::services::duel_service::JoinRequest;

use crate::state::AppState;

pub async fn handle_join_queue(
    state: &AppState,
    player_id: &str,
    preferences: QueuePreferences,
    display_name: Option<String>,
    avatar_ref: Option<String>,
    anonymous: bool,
) {
    let request = JoinRequest {
        preferences,
        display_name,
        avatar_ref,
        anonymous,
    };
    match state.duel_service.join_queue(player_id, request).await {
        Ok(ticket) => debug!("Player {} joined queue with ticket {}", player_id, ticket.ticket_id),
        Err(e) => {
            error!("Failed to join queue for player {}: {}", player_id, e);
            state.duel_service.reject(player_id, &e).await;
        }
    }
}

pub async fn handle_leave_queue(state: &AppState, player_id: &str) {
    if let Err(e) = state.duel_service.leave_queue(player_id).await {
        debug!("Player {} could not leave queue: {}", player_id, e);
        state.duel_service.reject(player_id, &e).await;
    }
}
