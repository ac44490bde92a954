use tracing::info;

use shared::models::question::Language;

use crate::state::AppState;

/// Grading can take seconds, so run/submit are handled off the socket loop.
pub fn handle_run_code(
    state: &AppState,
    player_id: &str,
    session_id: String,
    code: String,
    language: Language,
) {
    let service = state.duel_service.clone();
    let player_id = player_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = service
            .run_code(&player_id, &session_id, &code, language)
            .await
        {
            info!("Run from {} rejected: {}", player_id, e);
            service.reject(&player_id, &e).await;
        }
    });
}

pub fn handle_submit_code(
    state: &AppState,
    player_id: &str,
    session_id: String,
    code: String,
    language: Language,
) {
    let service = state.duel_service.clone();
    let player_id = player_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = service
            .submit_code(&player_id, &session_id, &code, language)
            .await
        {
            info!("Submit from {} rejected: {}", player_id, e);
            service.reject(&player_id, &e).await;
        }
    });
}
