#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionRepositoryError {
    NotFound(String),
    /// The connection's outbound channel is closed.
    Closed(String),
}

impl std::fmt::Display for ConnectionRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRepositoryError::NotFound(id) => write!(f, "Connection {} not found", id),
            ConnectionRepositoryError::Closed(id) => write!(f, "Connection {} is closed", id),
        }
    }
}

impl std::error::Error for ConnectionRepositoryError {}
