use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::grading::JudgeRequest;
use crate::models::question::QuestionRef;
use crate::models::submission::{AttemptOutcome, SubmissionAttempt};
use crate::repositories::errors::judge_repository_errors::JudgeRepositoryError;
use crate::repositories::judge_repository::JudgeRepository;

/// Sends one attempt to the judge with a bounded timeout and turns every failure
/// into an attempt outcome. Never retries; the player retries with a new attempt.
#[derive(Clone)]
pub struct GradingService {
    judge: Arc<dyn JudgeRepository>,
    timeout: Duration,
}

impl GradingService {
    pub fn new(judge: Arc<dyn JudgeRepository>, timeout: Duration) -> Self {
        GradingService { judge, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn grade(&self, question: &QuestionRef, attempt: &SubmissionAttempt) -> AttemptOutcome {
        let request = JudgeRequest {
            player_id: attempt.player.clone(),
            code: attempt.code.clone(),
            language: attempt.language,
            question_name: question.name.clone(),
            timeout: self.timeout.as_secs().max(1),
            mode: attempt.mode,
        };

        let call = self.judge.run_or_submit(&request, self.timeout);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => {
                info!(
                    "Attempt {} by {} graded: {}/{} passed",
                    attempt.attempt_id, attempt.player, result.total_passed, result.total_tests
                );
                AttemptOutcome::Completed(result)
            }
            Ok(Err(JudgeRepositoryError::Timeout)) | Err(_) => {
                warn!(
                    "Judge timed out on attempt {} by {}",
                    attempt.attempt_id, attempt.player
                );
                AttemptOutcome::TimedOut
            }
            Ok(Err(JudgeRepositoryError::Unavailable(message))) => {
                warn!(
                    "Judge failed attempt {} by {}: {}",
                    attempt.attempt_id, attempt.player, message
                );
                AttemptOutcome::Errored(message)
            }
        }
    }
}
