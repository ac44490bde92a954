use tracing::{debug, warn};

use shared::models::messages::{ClientMessage, ErrorCode, ServerEvent};
use shared::repositories::connection_repository::ConnectionRepository;

use crate::state::AppState;

pub mod code;
pub mod connect;
pub mod game;
pub mod queue;

/// Decodes one text frame and routes it. Undecodable input is answered with a
/// rejection on the same connection and never reaches a session.
pub async fn handle_message(state: &AppState, player_id: &str, connection_id: &str, text: &str) {
    let current = state.duel_service.directory().connection_of(player_id).await;
    if current.as_deref() != Some(connection_id) {
        debug!(
            "Dropping frame from superseded connection {} of {}",
            connection_id, player_id
        );
        return;
    }

    let message = match ClientMessage::decode(text) {
        Ok(message) => message,
        Err(rejection) => {
            debug!("Malformed message from {}: {}", player_id, text);
            send(state, connection_id, &rejection).await;
            return;
        }
    };

    match message {
        ClientMessage::JoinQueue {
            preferences,
            display_name,
            avatar_ref,
            anonymous,
        } => {
            queue::handle_join_queue(state, player_id, preferences, display_name, avatar_ref, anonymous)
                .await
        }
        ClientMessage::LeaveQueue => queue::handle_leave_queue(state, player_id).await,
        ClientMessage::QueueStatus => state.duel_service.queue_status(player_id).await,
        ClientMessage::Ready { session_id } => game::handle_ready(state, player_id, &session_id).await,
        ClientMessage::RunCode {
            session_id,
            code,
            language,
        } => code::handle_run_code(state, player_id, session_id, code, language),
        ClientMessage::SubmitCode {
            session_id,
            code,
            language,
        } => code::handle_submit_code(state, player_id, session_id, code, language),
        ClientMessage::PlayerStatus {
            session_id,
            activity,
        } => game::handle_player_status(state, player_id, &session_id, activity).await,
        ClientMessage::LeaveGame { session_id } => {
            game::handle_leave_game(state, player_id, &session_id).await
        }
        ClientMessage::Ping => state.duel_service.ping(player_id).await,
    }
}

pub async fn reject_malformed(state: &AppState, connection_id: &str, reason: &str) {
    let rejection = ServerEvent::Rejected {
        code: ErrorCode::MalformedMessage,
        message: reason.to_string(),
    };
    send(state, connection_id, &rejection).await;
}

async fn send(state: &AppState, connection_id: &str, event: &ServerEvent) {
    if let Err(e) = state.connections.send_event(connection_id, event).await {
        warn!("Failed to send to connection {}: {}", connection_id, e);
    }
}
