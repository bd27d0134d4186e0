use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ClipError {
    /// True for the two failures read paths treat as "absent".
    pub fn is_absent(&self) -> bool {
        matches!(self, ClipError::NotFound(_) | ClipError::Corrupt(_))
    }
}

pub type Result<T> = std::result::Result<T, ClipError>;
