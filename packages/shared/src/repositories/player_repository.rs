use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::player::Player;
use crate::repositories::errors::player_repository_errors::PlayerRepositoryError;

#[cfg(test)]
use mockall::automock;

/// View of the identity/profile subsystem. Registered players are read-only;
/// guests created at enqueue time are stored so their ratings can move.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlayerRepository: Send + Sync {
    async fn get_player_snapshot(&self, player_id: &str) -> Result<Player, PlayerRepositoryError>;

    async fn register_guest(&self, player: &Player) -> Result<(), PlayerRepositoryError>;
}

/// Process-local profile store, used by the standalone gateway and by tests.
#[derive(Default)]
pub struct InMemoryPlayerRepository {
    players: RwLock<HashMap<String, Player>>,
}

impl InMemoryPlayerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_players(players: Vec<Player>) -> Self {
        Self {
            players: RwLock::new(players.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub async fn upsert(&self, player: Player) {
        self.players.write().await.insert(player.id.clone(), player);
    }

    /// Adds `delta` to the stored rating. Unknown players are ignored.
    pub async fn adjust_rating(&self, player_id: &str, delta: i32) -> Option<i32> {
        let mut players = self.players.write().await;
        let player = players.get_mut(player_id)?;
        player.rating += delta;
        info!(
            "Adjusted rating for player {} by {} to {}",
            player_id, delta, player.rating
        );
        Some(player.rating)
    }
}

#[async_trait]
impl PlayerRepository for InMemoryPlayerRepository {
    async fn get_player_snapshot(&self, player_id: &str) -> Result<Player, PlayerRepositoryError> {
        self.players
            .read()
            .await
            .get(player_id)
            .cloned()
            .ok_or(PlayerRepositoryError::NotFound)
    }

    async fn register_guest(&self, player: &Player) -> Result<(), PlayerRepositoryError> {
        info!("Registering guest {}", player.id);
        self.upsert(player.clone()).await;
        Ok(())
    }
}
