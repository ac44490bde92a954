use crate::models::matchmaking::TicketId;
use crate::models::messages::ErrorCode;
use crate::models::player::PlayerId;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchmakingServiceError {
    AlreadyQueued(PlayerId),
    TicketNotFound(TicketId),
}

impl MatchmakingServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MatchmakingServiceError::AlreadyQueued(_) => ErrorCode::AlreadyQueued,
            MatchmakingServiceError::TicketNotFound(_) => ErrorCode::NotQueued,
        }
    }
}

impl std::fmt::Display for MatchmakingServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchmakingServiceError::AlreadyQueued(player_id) => {
                write!(f, "Player {} is already queued or in a session", player_id)
            }
            MatchmakingServiceError::TicketNotFound(ticket_id) => {
                write!(f, "Ticket {} is not in the queue", ticket_id)
            }
        }
    }
}

impl std::error::Error for MatchmakingServiceError {}
