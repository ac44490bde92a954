use std::sync::Arc;

use tracing::{info, warn};

use crate::models::messages::ServerEvent;
use crate::repositories::connection_repository::ConnectionRepository;
use crate::services::session_directory::SessionDirectory;

/// Delivers server events to whichever connection currently speaks for a player.
#[derive(Clone)]
pub struct NotificationService {
    directory: Arc<SessionDirectory>,
    connections: Arc<dyn ConnectionRepository>,
}

impl NotificationService {
    pub fn new(directory: Arc<SessionDirectory>, connections: Arc<dyn ConnectionRepository>) -> Self {
        Self {
            directory,
            connections,
        }
    }

    /// Returns false when the player has no live connection.
    pub async fn notify(&self, player_id: &str, event: &ServerEvent) -> bool {
        let Some(connection_id) = self.directory.connection_of(player_id).await else {
            info!(
                "Player {} is not connected, skipping notification",
                player_id
            );
            return false;
        };
        match self.connections.send_event(&connection_id, event).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to notify player {}: {}", player_id, err);
                false
            }
        }
    }

    /// Tells a superseded connection why it is going away, then closes it.
    pub async fn displace(&self, connection_id: &str) {
        let event = ServerEvent::ConnectionDisplaced {
            reason: "connected_elsewhere".to_string(),
        };
        if let Err(err) = self.connections.send_event(connection_id, &event).await {
            warn!("Failed to notify displaced connection {}: {}", connection_id, err);
        }
        self.connections.close_connection(connection_id).await;
    }

    pub async fn broadcast(&self, player_ids: &[String], event: &ServerEvent) {
        for player_id in player_ids {
            self.notify(player_id, event).await;
        }
    }
}
