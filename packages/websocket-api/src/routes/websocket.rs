use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub player_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(mut socket: WebSocket, params: ConnectParams, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let player_id = match params.player_id.filter(|id| !id.trim().is_empty()) {
        Some(player_id) => player_id,
        None => {
            debug!("No player_id in query parameters, using connection_id as player_id");
            format!("player_{}", connection_id)
        }
    };
    info!(
        "WebSocket connection {} established for player {}",
        connection_id, player_id
    );

    let mut outbound = state.connections.store_connection(&connection_id).await;
    actions::connect::handle_connect(&state, &player_id, &connection_id).await;

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    actions::handle_message(&state, &player_id, &connection_id, &text).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    actions::reject_malformed(&state, &connection_id, "binary frames are not supported").await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error on connection {}: {}", connection_id, e);
                    break;
                }
            },
            event = outbound.recv() => {
                let Some(event) = event else {
                    info!("Connection {} was displaced, closing", connection_id);
                    if socket.send(Message::Close(None)).await.is_err() {
                        debug!("Connection {} already gone", connection_id);
                    }
                    break;
                };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to encode event for connection {}: {}", connection_id, e);
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    debug!("Connection {} closed while sending", connection_id);
                    break;
                }
            }
        }
    }

    actions::connect::handle_disconnect(&state, &player_id, &connection_id).await;
    info!("WebSocket connection {} closed", connection_id);
}
