use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::PairingPolicy;
use crate::models::matchmaking::{
    MatchmakingTicket, Pairing, QueuePreferences, QueueStatus, TicketId,
};
use crate::models::player::Player;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;

#[derive(Default)]
struct QueueState {
    /// Oldest first.
    tickets: Vec<MatchmakingTicket>,
    /// Players that hold a session. Released when the session terminates.
    engaged: HashSet<String>,
    next_sequence: u64,
}

impl QueueState {
    fn holds_ticket(&self, player_id: &str) -> bool {
        self.tickets.iter().any(|t| t.player.id == player_id)
    }

    fn remove_where<F>(&mut self, predicate: F) -> Option<MatchmakingTicket>
    where
        F: Fn(&MatchmakingTicket) -> bool,
    {
        let index = self.tickets.iter().position(predicate)?;
        Some(self.tickets.remove(index))
    }

    /// Index pair (anchor, partner) for the next match, if any.
    fn find_pair(&self, policy: &PairingPolicy, now: DateTime<Utc>) -> Option<(usize, usize)> {
        for (i, anchor) in self.tickets.iter().enumerate() {
            let waited = anchor.waited(now).to_std().unwrap_or_default();
            let tolerance = policy.tolerance_after(waited) as i64;

            let partner = self
                .tickets
                .iter()
                .enumerate()
                .skip(i + 1)
                .filter(|(_, candidate)| {
                    candidate.player.id != anchor.player.id
                        && anchor.preferences.is_compatible_with(&candidate.preferences)
                })
                .map(|(j, candidate)| {
                    let distance = (anchor.rating() as i64 - candidate.rating() as i64).abs();
                    (j, distance, candidate)
                })
                .filter(|(_, distance, _)| *distance <= tolerance)
                .min_by_key(|(_, distance, candidate)| {
                    (*distance, candidate.enqueued_at, candidate.sequence)
                });

            if let Some((j, _, _)) = partner {
                return Some((i, j));
            }
        }
        None
    }
}

/// Waiting players and the pairing algorithm. Every mutation happens under one lock,
/// so the "already queued or in a session" check and ticket consumption are atomic.
pub struct MatchmakingService {
    state: Mutex<QueueState>,
    policy: PairingPolicy,
    max_wait: Duration,
}

impl MatchmakingService {
    pub fn new(policy: PairingPolicy, max_wait: Duration) -> Self {
        MatchmakingService {
            state: Mutex::new(QueueState::default()),
            policy,
            max_wait,
        }
    }

    pub async fn enqueue(
        &self,
        player: Player,
        preferences: QueuePreferences,
        now: DateTime<Utc>,
    ) -> Result<MatchmakingTicket, MatchmakingServiceError> {
        let mut state = self.state.lock().await;
        if state.engaged.contains(&player.id) || state.holds_ticket(&player.id) {
            info!("Player {} tried to enqueue twice", player.id);
            return Err(MatchmakingServiceError::AlreadyQueued(player.id));
        }

        let preferences = if preferences.difficulties.is_empty() {
            QueuePreferences::any()
        } else {
            preferences
        };
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let ticket = MatchmakingTicket::new(player, preferences, now, sequence);
        info!(
            "Enqueued player {} (rating {}) with ticket {}",
            ticket.player.id,
            ticket.rating(),
            ticket.ticket_id
        );
        state.tickets.push(ticket.clone());
        Ok(ticket)
    }

    /// Removes a ticket that has not been paired yet. Returns None when it is already gone.
    pub async fn cancel(&self, ticket_id: &str) -> Option<MatchmakingTicket> {
        let removed = self
            .state
            .lock()
            .await
            .remove_where(|t| t.ticket_id == ticket_id);
        match &removed {
            Some(ticket) => info!("Cancelled ticket {} for player {}", ticket_id, ticket.player.id),
            None => debug!("Ticket {} already paired or removed", ticket_id),
        }
        removed
    }

    pub async fn cancel_for_player(
        &self,
        player_id: &str,
    ) -> Result<MatchmakingTicket, MatchmakingServiceError> {
        let ticket_id = {
            let state = self.state.lock().await;
            state
                .tickets
                .iter()
                .find(|t| t.player.id == player_id)
                .map(|t| t.ticket_id.clone())
        };
        let ticket_id =
            ticket_id.ok_or_else(|| MatchmakingServiceError::TicketNotFound(player_id.to_string()))?;
        self.cancel(&ticket_id)
            .await
            .ok_or(MatchmakingServiceError::TicketNotFound(ticket_id))
    }

    /// Pairs as many tickets as the current tolerance windows allow. Both tickets of a
    /// pairing leave the queue together and their players become engaged.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<Pairing> {
        let mut state = self.state.lock().await;
        let mut pairings = Vec::new();

        while let Some((i, j)) = state.find_pair(&self.policy, now) {
            // j > i, so removing j first keeps i valid.
            let second = state.tickets.remove(j);
            let first = state.tickets.remove(i);
            state.engaged.insert(first.player.id.clone());
            state.engaged.insert(second.player.id.clone());

            info!(
                "Paired {} ({}) with {} ({})",
                first.player.id,
                first.rating(),
                second.player.id,
                second.rating()
            );
            let common_difficulties = first.preferences.common_difficulties(&second.preferences);
            pairings.push(Pairing {
                first,
                second,
                common_difficulties,
            });
        }
        pairings
    }

    pub async fn expire_ticket(&self, ticket_id: &str) -> Option<MatchmakingTicket> {
        let expired = self
            .state
            .lock()
            .await
            .remove_where(|t| t.ticket_id == ticket_id);
        if let Some(ticket) = &expired {
            info!("Ticket {} for player {} expired", ticket_id, ticket.player.id);
        }
        expired
    }

    /// Removes every ticket that waited at least the configured maximum.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Vec<MatchmakingTicket> {
        let overdue: Vec<TicketId> = {
            let state = self.state.lock().await;
            state
                .tickets
                .iter()
                .filter(|t| t.waited(now).to_std().unwrap_or_default() >= self.max_wait)
                .map(|t| t.ticket_id.clone())
                .collect()
        };

        let mut expired = Vec::with_capacity(overdue.len());
        for ticket_id in overdue {
            if let Some(ticket) = self.expire_ticket(&ticket_id).await {
                expired.push(ticket);
            }
        }
        expired
    }

    pub async fn queue_status(&self, player_id: &str, now: DateTime<Utc>) -> Option<QueueStatus> {
        let state = self.state.lock().await;
        let queue_length = state.tickets.len();
        state
            .tickets
            .iter()
            .position(|t| t.player.id == player_id)
            .map(|index| {
                let ticket = &state.tickets[index];
                QueueStatus {
                    ticket_id: ticket.ticket_id.clone(),
                    position: index + 1,
                    queue_length,
                    waited_secs: ticket.waited(now).num_seconds(),
                }
            })
    }

    /// Frees a player after their session ended so they may queue again.
    pub async fn release(&self, player_id: &str) {
        if self.state.lock().await.engaged.remove(player_id) {
            debug!("Released player {}", player_id);
        }
    }

    pub async fn is_engaged(&self, player_id: &str) -> bool {
        self.state.lock().await.engaged.contains(player_id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tickets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.tickets.is_empty()
    }
}
