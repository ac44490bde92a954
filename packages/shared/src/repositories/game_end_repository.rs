use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::game_end::GameEndRecord;
use crate::repositories::errors::game_end_repository_errors::GameEndRepositoryError;
use crate::repositories::player_repository::InMemoryPlayerRepository;

/// Rating/persistence sink. Redelivering the same record must not re-apply its deltas.
#[async_trait]
pub trait GameEndRepository: Send + Sync {
    /// Returns true when the record was applied, false when it had already been applied.
    async fn apply_game_end(&self, record: &GameEndRecord) -> Result<bool, GameEndRepositoryError>;
}

/// Keeps applied records keyed by session id and forwards rating deltas to the profile store.
pub struct InMemoryGameEndRepository {
    records: RwLock<HashMap<String, GameEndRecord>>,
    players: Option<Arc<InMemoryPlayerRepository>>,
}

impl InMemoryGameEndRepository {
    pub fn new(players: Option<Arc<InMemoryPlayerRepository>>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            players,
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<GameEndRecord> {
        self.records.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl GameEndRepository for InMemoryGameEndRepository {
    async fn apply_game_end(&self, record: &GameEndRecord) -> Result<bool, GameEndRepositoryError> {
        // Held across the rating update so a concurrent redelivery cannot slip in between.
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(record.session_id()) {
            if existing == record {
                info!(
                    "Game end for session {} already applied, ignoring redelivery",
                    record.session_id()
                );
                return Ok(false);
            }
            warn!(
                "Rejected conflicting game end record for session {}",
                record.session_id()
            );
            return Err(GameEndRepositoryError::Conflict(
                record.session_id().to_string(),
            ));
        }

        if let Some(players) = &self.players {
            for participant in record.participants() {
                if let Some(delta) = record.rating_delta_for(participant) {
                    players.adjust_rating(participant, delta).await;
                }
            }
        }

        records.insert(record.session_id().to_string(), record.clone());
        info!("Applied game end for session {}", record.session_id());
        Ok(true)
    }
}
