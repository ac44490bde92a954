#[derive(Debug, Clone, PartialEq)]
pub enum PlayerRepositoryError {
    NotFound,
    Unavailable(String),
}

impl std::fmt::Display for PlayerRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerRepositoryError::NotFound => write!(f, "Player not found"),
            PlayerRepositoryError::Unavailable(msg) => {
                write!(f, "Identity service unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for PlayerRepositoryError {}
