use serde::{Deserialize, Serialize};

use crate::models::player::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEndReason {
    /// A player passed the full test set before the deadline.
    Completed,
    /// Deadline passed; the better partial result won.
    Timeout,
    /// Deadline passed with identical partial results.
    Draw,
    /// A player left or stayed disconnected past the grace period.
    Forfeit,
}

/// The single immutable artifact describing how a session concluded.
/// Fields are private so a record cannot be altered once the resolver produced it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GameEndRecord {
    session_id: String,
    winner_id: Option<PlayerId>,
    loser_id: Option<PlayerId>,
    participants: [PlayerId; 2],
    reason: GameEndReason,
    winner_time_ms: Option<u64>,
    loser_time_ms: Option<u64>,
    rating_delta_winner: i32,
    rating_delta_loser: i32,
}

impl GameEndRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn decided(
        session_id: &str,
        winner_id: &str,
        loser_id: &str,
        reason: GameEndReason,
        winner_time_ms: Option<u64>,
        loser_time_ms: Option<u64>,
        rating_delta_winner: i32,
        rating_delta_loser: i32,
    ) -> Self {
        GameEndRecord {
            session_id: session_id.to_string(),
            winner_id: Some(winner_id.to_string()),
            loser_id: Some(loser_id.to_string()),
            participants: [winner_id.to_string(), loser_id.to_string()],
            reason,
            winner_time_ms,
            loser_time_ms,
            rating_delta_winner,
            rating_delta_loser,
        }
    }

    /// No winner. Deltas are reported in participant order (player_a, player_b).
    pub fn draw(
        session_id: &str,
        player_a: &str,
        player_b: &str,
        player_a_time_ms: Option<u64>,
        player_b_time_ms: Option<u64>,
        rating_delta_a: i32,
        rating_delta_b: i32,
    ) -> Self {
        GameEndRecord {
            session_id: session_id.to_string(),
            winner_id: None,
            loser_id: None,
            participants: [player_a.to_string(), player_b.to_string()],
            reason: GameEndReason::Draw,
            winner_time_ms: player_a_time_ms,
            loser_time_ms: player_b_time_ms,
            rating_delta_winner: rating_delta_a,
            rating_delta_loser: rating_delta_b,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner_id.as_deref()
    }

    pub fn loser_id(&self) -> Option<&str> {
        self.loser_id.as_deref()
    }

    pub fn participants(&self) -> &[PlayerId; 2] {
        &self.participants
    }

    pub fn reason(&self) -> GameEndReason {
        self.reason
    }

    pub fn is_draw(&self) -> bool {
        self.winner_id.is_none()
    }

    pub fn winner_time_ms(&self) -> Option<u64> {
        self.winner_time_ms
    }

    pub fn loser_time_ms(&self) -> Option<u64> {
        self.loser_time_ms
    }

    pub fn rating_delta_winner(&self) -> i32 {
        self.rating_delta_winner
    }

    pub fn rating_delta_loser(&self) -> i32 {
        self.rating_delta_loser
    }

    /// Rating change for one participant, if they took part.
    pub fn rating_delta_for(&self, player_id: &str) -> Option<i32> {
        if self.participants[0] == player_id {
            Some(self.rating_delta_winner)
        } else if self.participants[1] == player_id {
            Some(self.rating_delta_loser)
        } else {
            None
        }
    }
}
