#[derive(Debug, Clone, PartialEq)]
pub enum JudgeRepositoryError {
    /// Transport failure, non-success status, or an unreadable response.
    Unavailable(String),
    Timeout,
}

impl std::fmt::Display for JudgeRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeRepositoryError::Unavailable(msg) => write!(f, "Judge unavailable: {}", msg),
            JudgeRepositoryError::Timeout => write!(f, "Judge timed out"),
        }
    }
}

impl std::error::Error for JudgeRepositoryError {}

impl From<reqwest::Error> for JudgeRepositoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            JudgeRepositoryError::Timeout
        } else {
            JudgeRepositoryError::Unavailable(err.to_string())
        }
    }
}
