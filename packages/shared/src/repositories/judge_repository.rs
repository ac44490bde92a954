use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::models::grading::{GradingResult, JudgeRequest, JudgeResponse, SubmissionMode};
use crate::repositories::errors::judge_repository_errors::JudgeRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Thin adapter around the external grading sandbox. One outbound call per
/// invocation, no retries and no internal state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JudgeRepository: Send + Sync {
    async fn run_or_submit(
        &self,
        request: &JudgeRequest,
        timeout: Duration,
    ) -> Result<GradingResult, JudgeRepositoryError>;
}

pub struct HttpJudgeRepository {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJudgeRepository {
    /// The client's connection pool is shared by every session in the process.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, mode: SubmissionMode) -> String {
        match mode {
            SubmissionMode::Run => format!("{}/api/run-sample-tests", self.base_url),
            SubmissionMode::Submit => format!("{}/api/run-all-tests", self.base_url),
        }
    }
}

#[async_trait]
impl JudgeRepository for HttpJudgeRepository {
    async fn run_or_submit(
        &self,
        request: &JudgeRequest,
        timeout: Duration,
    ) -> Result<GradingResult, JudgeRepositoryError> {
        let url = self.endpoint(request.mode);
        debug!(
            "Dispatching {:?} for player {} on {} to {}",
            request.mode, request.player_id, request.question_name, url
        );

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JudgeRepositoryError::Unavailable(format!(
                "judge responded with status {}",
                status
            )));
        }

        let body: JudgeResponse = response.json().await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(GradingResult::from_response(body, elapsed_ms))
    }
}
