use crate::models::duel_session::{DuelState, TransitionError};
use crate::models::messages::ErrorCode;
use crate::repositories::errors::player_repository_errors::PlayerRepositoryError;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;

#[derive(Debug, Clone, PartialEq)]
pub enum DuelServiceError {
    MatchmakingError(MatchmakingServiceError),
    TransitionError(TransitionError),
    PlayerError(PlayerRepositoryError),
    SessionNotFound(String),
    NotInSession(String),
    NotQueued(String),
    NoQuestionAvailable,
    ShuttingDown,
}

impl DuelServiceError {
    /// Stable reason code sent to the client with the rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            DuelServiceError::MatchmakingError(err) => err.code(),
            DuelServiceError::TransitionError(err) => match err {
                TransitionError::NotAParticipant(_) => ErrorCode::NotInSession,
                TransitionError::InvalidState(DuelState::WaitingStart) => {
                    ErrorCode::SessionNotStarted
                }
                TransitionError::InvalidState(DuelState::Aborted) => ErrorCode::SessionAborted,
                TransitionError::InvalidState(_) | TransitionError::SessionClosed => {
                    ErrorCode::SessionEnded
                }
                TransitionError::DeadlinePassed => ErrorCode::DeadlinePassed,
                TransitionError::SubmissionInFlight => ErrorCode::SubmissionInFlight,
                TransitionError::UnknownAttempt(_) | TransitionError::InvariantViolation(_) => {
                    ErrorCode::InternalError
                }
            },
            DuelServiceError::PlayerError(PlayerRepositoryError::NotFound) => {
                ErrorCode::UnknownPlayer
            }
            DuelServiceError::PlayerError(_) => ErrorCode::InternalError,
            DuelServiceError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            DuelServiceError::NotInSession(_) => ErrorCode::NotInSession,
            DuelServiceError::NotQueued(_) => ErrorCode::NotQueued,
            DuelServiceError::NoQuestionAvailable => ErrorCode::NoQuestionAvailable,
            DuelServiceError::ShuttingDown => ErrorCode::InternalError,
        }
    }
}

impl std::fmt::Display for DuelServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuelServiceError::MatchmakingError(err) => write!(f, "Matchmaking error: {}", err),
            DuelServiceError::TransitionError(err) => write!(f, "Session error: {}", err),
            DuelServiceError::PlayerError(err) => write!(f, "Player lookup error: {}", err),
            DuelServiceError::SessionNotFound(session_id) => {
                write!(f, "Session {} not found", session_id)
            }
            DuelServiceError::NotInSession(player_id) => {
                write!(f, "Player {} is not in a session", player_id)
            }
            DuelServiceError::NotQueued(player_id) => {
                write!(f, "Player {} is not queued", player_id)
            }
            DuelServiceError::NoQuestionAvailable => {
                write!(f, "No question available for the requested difficulty")
            }
            DuelServiceError::ShuttingDown => write!(f, "Service is shutting down"),
        }
    }
}

impl std::error::Error for DuelServiceError {}

impl From<MatchmakingServiceError> for DuelServiceError {
    fn from(err: MatchmakingServiceError) -> Self {
        DuelServiceError::MatchmakingError(err)
    }
}

impl From<TransitionError> for DuelServiceError {
    fn from(err: TransitionError) -> Self {
        DuelServiceError::TransitionError(err)
    }
}

impl From<PlayerRepositoryError> for DuelServiceError {
    fn from(err: PlayerRepositoryError) -> Self {
        DuelServiceError::PlayerError(err)
    }
}
