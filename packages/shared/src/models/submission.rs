use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::grading::{GradingResult, SubmissionMode};
use crate::models::player::PlayerId;
use crate::models::question::Language;

pub type AttemptId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Completed,
    TimedOut,
    Errored,
}

/// How the grading coordinator resolved an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Completed(GradingResult),
    TimedOut,
    Errored(String),
}

impl AttemptOutcome {
    pub fn status(&self) -> AttemptStatus {
        match self {
            AttemptOutcome::Completed(_) => AttemptStatus::Completed,
            AttemptOutcome::TimedOut => AttemptStatus::TimedOut,
            AttemptOutcome::Errored(_) => AttemptStatus::Errored,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubmissionAttempt {
    pub attempt_id: AttemptId,
    pub player: PlayerId,
    pub mode: SubmissionMode,
    #[serde(skip_serializing, default)]
    pub code: String,
    pub language: Language,
    pub submitted_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub result: Option<GradingResult>,
    pub error: Option<String>,
}

impl SubmissionAttempt {
    pub fn new(
        attempt_id: AttemptId,
        player: &str,
        mode: SubmissionMode,
        code: &str,
        language: Language,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        SubmissionAttempt {
            attempt_id,
            player: player.to_string(),
            mode,
            code: code.to_string(),
            language,
            submitted_at,
            status: AttemptStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AttemptStatus::Pending
    }

    /// Resolves a pending attempt. Resolved attempts are immutable; returns false if already resolved.
    pub fn resolve(&mut self, outcome: AttemptOutcome) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = outcome.status();
        match outcome {
            AttemptOutcome::Completed(result) => self.result = Some(result),
            AttemptOutcome::TimedOut => self.error = Some("Judge timed out".to_string()),
            AttemptOutcome::Errored(message) => self.error = Some(message),
        }
        true
    }

    pub fn is_successful_submit(&self) -> bool {
        self.mode == SubmissionMode::Submit
            && self.status == AttemptStatus::Completed
            && self.result.as_ref().is_some_and(|r| r.success)
    }

    pub fn graded_submit(&self) -> Option<&GradingResult> {
        if self.mode == SubmissionMode::Submit && self.status == AttemptStatus::Completed {
            self.result.as_ref()
        } else {
            None
        }
    }
}
