use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::models::duel_session::{DuelSession, SessionId};
use crate::models::player::PlayerId;
use crate::repositories::connection_repository::ConnectionId;
use crate::services::session_timers::SessionTimers;

/// One live session: the state machine behind its exclusive lock, plus its timers.
pub struct SessionHandle {
    session_id: SessionId,
    session: Mutex<DuelSession>,
    timers: SessionTimers,
}

impl SessionHandle {
    pub fn new(session: DuelSession) -> Arc<Self> {
        Arc::new(SessionHandle {
            session_id: session.session_id().to_string(),
            session: Mutex::new(session),
            timers: SessionTimers::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Every state transition of the session happens while this guard is held.
    pub async fn lock(&self) -> MutexGuard<'_, DuelSession> {
        self.session.lock().await
    }

    pub fn timers(&self) -> &SessionTimers {
        &self.timers
    }
}

/// Process-wide registry of live sessions and of which connection currently
/// speaks for which player. Created at service start, drained on shutdown.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    players: RwLock<HashMap<PlayerId, SessionId>>,
    connections: RwLock<HashMap<PlayerId, ConnectionId>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: Arc<SessionHandle>, player_ids: &[PlayerId]) {
        let session_id = handle.session_id().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), handle);
        let mut players = self.players.write().await;
        for player_id in player_ids {
            players.insert(player_id.clone(), session_id.clone());
        }
        info!("Registered session {}", session_id);
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn session_for_player(&self, player_id: &str) -> Option<Arc<SessionHandle>> {
        let session_id = self.players.read().await.get(player_id).cloned()?;
        self.get(&session_id).await
    }

    /// Drops the session and any player entries still pointing at it.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(session_id);
        self.players
            .write()
            .await
            .retain(|_, mapped| mapped != session_id);
        if removed.is_some() {
            info!("Removed session {}", session_id);
        }
        removed
    }

    pub async fn all(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns the connection this one replaced, if any.
    pub async fn bind_connection(&self, player_id: &str, connection_id: &str) -> Option<ConnectionId> {
        debug!("Binding player {} to connection {}", player_id, connection_id);
        self.connections
            .write()
            .await
            .insert(player_id.to_string(), connection_id.to_string())
    }

    /// Unbinds only if `connection_id` is still the player's current connection.
    /// A stale socket closing after a reconnect leaves the new binding alone.
    pub async fn unbind_connection(&self, player_id: &str, connection_id: &str) -> bool {
        let mut connections = self.connections.write().await;
        if connections.get(player_id).map(String::as_str) == Some(connection_id) {
            connections.remove(player_id);
            true
        } else {
            false
        }
    }

    pub async fn connection_of(&self, player_id: &str) -> Option<ConnectionId> {
        self.connections.read().await.get(player_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::player::Player;
    use crate::models::question::{Difficulty, QuestionRef};
    use chrono::Utc;

    fn handle(session_id: &str) -> Arc<SessionHandle> {
        SessionHandle::new(DuelSession::new(
            session_id,
            Player::new("alice", "Alice", 1500),
            Player::new("bob", "Bob", 1500),
            QuestionRef::new("two-sum", Difficulty::Easy),
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn test_lookup_by_player_and_removal() {
        let directory = SessionDirectory::new();
        directory
            .insert(handle("s-1"), &["alice".to_string(), "bob".to_string()])
            .await;

        let found = directory.session_for_player("bob").await.unwrap();
        assert_eq!(found.session_id(), "s-1");

        directory.remove("s-1").await;
        assert!(directory.session_for_player("alice").await.is_none());
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn test_stale_connection_does_not_unbind_new_one() {
        let directory = SessionDirectory::new();
        directory.bind_connection("alice", "conn-1").await;
        assert_eq!(
            directory.bind_connection("alice", "conn-2").await,
            Some("conn-1".to_string())
        );

        assert!(!directory.unbind_connection("alice", "conn-1").await);
        assert_eq!(directory.connection_of("alice").await, Some("conn-2".to_string()));
        assert!(directory.unbind_connection("alice", "conn-2").await);
        assert!(directory.connection_of("alice").await.is_none());
    }
}
