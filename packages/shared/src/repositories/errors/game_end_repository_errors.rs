#[derive(Debug, Clone, PartialEq)]
pub enum GameEndRepositoryError {
    /// Same session id redelivered with different content.
    Conflict(String),
    Storage(String),
}

impl std::fmt::Display for GameEndRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameEndRepositoryError::Conflict(session_id) => write!(
                f,
                "Conflicting game end record for session {}",
                session_id
            ),
            GameEndRepositoryError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for GameEndRepositoryError {}
