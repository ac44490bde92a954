use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::player::Player;
use crate::models::question::Difficulty;

pub type TicketId = String;

/// Which problems a player is willing to be matched on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueuePreferences {
    pub difficulties: BTreeSet<Difficulty>,
}

impl QueuePreferences {
    pub fn new(difficulties: &[Difficulty]) -> Self {
        QueuePreferences {
            difficulties: difficulties.iter().copied().collect(),
        }
    }

    pub fn any() -> Self {
        Self::new(&Difficulty::ALL)
    }

    pub fn common_difficulties(&self, other: &QueuePreferences) -> Vec<Difficulty> {
        self.difficulties
            .intersection(&other.difficulties)
            .copied()
            .collect()
    }

    pub fn is_compatible_with(&self, other: &QueuePreferences) -> bool {
        !self.difficulties.is_disjoint(&other.difficulties)
    }
}

impl Default for QueuePreferences {
    fn default() -> Self {
        Self::any()
    }
}

/// A player's place in the matchmaking queue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatchmakingTicket {
    pub ticket_id: TicketId,
    pub player: Player,
    pub enqueued_at: DateTime<Utc>,
    pub preferences: QueuePreferences,
    /// Insertion order, breaks ties between tickets enqueued in the same millisecond.
    pub sequence: u64,
}

impl MatchmakingTicket {
    pub fn new(
        player: Player,
        preferences: QueuePreferences,
        enqueued_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        MatchmakingTicket {
            ticket_id: Uuid::new_v4().to_string(),
            player,
            enqueued_at,
            preferences,
            sequence,
        }
    }

    pub fn waited(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.enqueued_at).max(chrono::Duration::zero())
    }

    pub fn rating(&self) -> i32 {
        self.player.rating
    }
}

/// Two tickets consumed together. `first` is always the older ticket and becomes player_a.
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub first: MatchmakingTicket,
    pub second: MatchmakingTicket,
    pub common_difficulties: Vec<Difficulty>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueStatus {
    pub ticket_id: TicketId,
    pub position: usize,
    pub queue_length: usize,
    pub waited_secs: i64,
}
