use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::duel_session::{PlayerActivity, SessionId, SessionSnapshot};
use crate::models::game_end::GameEndRecord;
use crate::models::grading::GradingResult;
use crate::models::matchmaking::{QueuePreferences, QueueStatus, TicketId};
use crate::models::player::PublicProfile;
use crate::models::question::{Language, QuestionRef};
use crate::models::submission::{AttemptId, AttemptStatus};

/// Stable reason codes carried by every rejection so clients can react without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AlreadyQueued,
    NotQueued,
    QueueTimeout,
    UnknownPlayer,
    NoQuestionAvailable,
    SubmissionInFlight,
    JudgeTimeout,
    JudgeUnavailable,
    SessionNotFound,
    SessionNotStarted,
    SessionEnded,
    SessionAborted,
    DeadlinePassed,
    NotInSession,
    MalformedMessage,
    InternalError,
}

/// Client → server messages, decoded and validated before they reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinQueue {
        #[serde(default)]
        preferences: QueuePreferences,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        avatar_ref: Option<String>,
        #[serde(default)]
        anonymous: bool,
    },
    LeaveQueue,
    QueueStatus,
    Ready {
        session_id: SessionId,
    },
    RunCode {
        session_id: SessionId,
        code: String,
        language: Language,
    },
    SubmitCode {
        session_id: SessionId,
        code: String,
        language: Language,
    },
    PlayerStatus {
        session_id: SessionId,
        activity: PlayerActivity,
    },
    LeaveGame {
        session_id: SessionId,
    },
    Ping,
}

impl ClientMessage {
    /// Decodes a text frame. Anything unknown or malformed fails closed with a rejection event.
    pub fn decode(text: &str) -> Result<ClientMessage, ServerEvent> {
        serde_json::from_str(text).map_err(|e| ServerEvent::Rejected {
            code: ErrorCode::MalformedMessage,
            message: format!("Invalid message: {}", e),
        })
    }
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    QueueJoined {
        ticket_id: TicketId,
        position: usize,
    },
    QueueLeft {
        ticket_id: TicketId,
    },
    QueueStatus {
        in_queue: bool,
        status: Option<QueueStatus>,
    },
    QueueTimeout {
        ticket_id: TicketId,
    },
    MatchFound {
        session_id: SessionId,
        opponent: PublicProfile,
        question: QuestionRef,
        /// Latest possible end of the duel: start grace plus duel duration.
        /// `game_start` carries the exact deadline once the clock starts.
        deadline: DateTime<Utc>,
        ready_by: DateTime<Utc>,
    },
    GameStart {
        session_id: SessionId,
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
    AttemptAccepted {
        session_id: SessionId,
        attempt_id: AttemptId,
    },
    RunResult {
        session_id: SessionId,
        attempt_id: AttemptId,
        status: AttemptStatus,
        result: Option<GradingResult>,
        error: Option<String>,
        hidden_tests_excluded: bool,
    },
    SubmitResult {
        session_id: SessionId,
        attempt_id: AttemptId,
        status: AttemptStatus,
        result: Option<GradingResult>,
        error: Option<String>,
    },
    OpponentProgress {
        session_id: SessionId,
        activity: PlayerActivity,
        total_passed: Option<u32>,
        total_tests: Option<u32>,
    },
    OpponentConnection {
        session_id: SessionId,
        connected: bool,
    },
    SessionSnapshot {
        snapshot: SessionSnapshot,
    },
    GameEnd {
        record: GameEndRecord,
    },
    SessionAborted {
        session_id: SessionId,
        reason: String,
    },
    Rejected {
        code: ErrorCode,
        message: String,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    /// Sent to a connection just before it is closed in favour of a newer one.
    ConnectionDisplaced {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Difficulty;

    #[test]
    fn test_decode_join_queue_with_defaults() {
        let message = ClientMessage::decode(r#"{"action": "join_queue"}"#).unwrap();

        match message {
            ClientMessage::JoinQueue {
                preferences,
                anonymous,
                ..
            } => {
                assert_eq!(preferences, QueuePreferences::any());
                assert!(!anonymous);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_decode_submit_code() {
        let message = ClientMessage::decode(
            r#"{"action": "submit_code", "session_id": "s1", "code": "x", "language": "java"}"#,
        )
        .unwrap();

        assert_eq!(
            message,
            ClientMessage::SubmitCode {
                session_id: "s1".to_string(),
                code: "x".to_string(),
                language: Language::Java,
            }
        );
    }

    #[test]
    fn test_decode_preferences() {
        let message = ClientMessage::decode(
            r#"{"action": "join_queue", "preferences": {"difficulties": ["hard"]}}"#,
        )
        .unwrap();

        assert!(matches!(
            message,
            ClientMessage::JoinQueue { preferences, .. }
                if preferences == QueuePreferences::new(&[Difficulty::Hard])
        ));
    }

    #[test]
    fn test_unknown_action_fails_closed() {
        let rejection = ClientMessage::decode(r#"{"action": "drop_tables"}"#).unwrap_err();

        assert!(matches!(
            rejection,
            ServerEvent::Rejected {
                code: ErrorCode::MalformedMessage,
                ..
            }
        ));
    }

    #[test]
    fn test_non_json_fails_closed() {
        assert!(ClientMessage::decode("not json").is_err());
        assert!(ClientMessage::decode(r#"{"action": "run_code", "session_id": "s1"}"#).is_err());
    }

    #[test]
    fn test_event_tagging() {
        let event = ServerEvent::Rejected {
            code: ErrorCode::SubmissionInFlight,
            message: "busy".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "rejected");
        assert_eq!(json["code"], "submission_in_flight");
    }
}
