use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::models::messages::ServerEvent;
use crate::repositories::errors::connection_repository_errors::ConnectionRepositoryError;

pub type ConnectionId = String;

/// Outbound side of the real-time channel.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn send_event(
        &self,
        connection_id: &str,
        event: &ServerEvent,
    ) -> Result<(), ConnectionRepositoryError>;

    /// Ends the connection once the events already sent to it are flushed.
    async fn close_connection(&self, connection_id: &str);
}

/// Each live connection owns an unbounded channel drained by its socket writer.
#[derive(Default)]
pub struct InMemoryConnectionRepository {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl InMemoryConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store_connection(
        &self,
        connection_id: &str,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders
            .write()
            .await
            .insert(connection_id.to_string(), sender);
        info!("Stored connection {}", connection_id);
        receiver
    }

    pub async fn remove_connection(&self, connection_id: &str) {
        if self.senders.write().await.remove(connection_id).is_some() {
            info!("Removed connection {}", connection_id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn send_event(
        &self,
        connection_id: &str,
        event: &ServerEvent,
    ) -> Result<(), ConnectionRepositoryError> {
        let senders = self.senders.read().await;
        let sender = senders
            .get(connection_id)
            .ok_or_else(|| ConnectionRepositoryError::NotFound(connection_id.to_string()))?;
        debug!("Sending {:?} to connection {}", event, connection_id);
        sender
            .send(event.clone())
            .map_err(|_| ConnectionRepositoryError::Closed(connection_id.to_string()))
    }

    /// Dropping the sender lets the socket writer drain what is queued, then stop.
    async fn close_connection(&self, connection_id: &str) {
        self.remove_connection(connection_id).await;
    }
}
