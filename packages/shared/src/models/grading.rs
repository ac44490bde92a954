use serde::{Deserialize, Serialize};

use crate::models::question::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Sample tests only. Never affects the outcome.
    Run,
    /// Full grading including hidden tests.
    Submit,
}

/// Request body sent to the grading sandbox.
/// Carries the submitting player's own id only, never the session or the opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub player_id: String,
    pub code: String,
    pub language: Language,
    pub question_name: String,
    /// Seconds the sandbox may spend on this request.
    pub timeout: u64,
    pub mode: SubmissionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub passed: bool,
    #[serde(default)]
    pub expected_output: serde_json::Value,
    #[serde(default)]
    pub actual_output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Raw sandbox response. `total_tests` is optional on the wire; older sandboxes
/// only report `total_failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResponse {
    pub success: bool,
    #[serde(default)]
    pub total_passed: u32,
    #[serde(default)]
    pub total_tests: Option<u32>,
    #[serde(default)]
    pub total_failed: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub test_results: Vec<TestCaseResult>,
}

/// The judge's verdict for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub success: bool,
    pub total_passed: u32,
    pub total_tests: u32,
    pub elapsed_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub test_results: Vec<TestCaseResult>,
}

impl GradingResult {
    pub fn from_response(response: JudgeResponse, elapsed_time_ms: u64) -> Self {
        let total_tests = response
            .total_tests
            .or_else(|| response.total_failed.map(|failed| failed + response.total_passed))
            .unwrap_or(response.test_results.len() as u32)
            .max(response.total_passed);

        GradingResult {
            success: response.success,
            total_passed: response.total_passed,
            total_tests,
            elapsed_time_ms,
            error: response.error,
            test_results: response.test_results,
        }
    }

    /// Fraction of tests passed, 0.0 when the judge reported no tests.
    pub fn pass_ratio(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.total_passed as f64 / self.total_tests as f64
        }
    }
}
