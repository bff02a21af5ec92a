use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input (k == 0, threshold outside [-1, 1], zero limit).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Unsupported intent: {0}")]
    UnsupportedIntent(String),

    /// Every requested retrieval source failed.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a caller may retry the failed operation with backoff.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_) | Error::ConnectionError(_) | Error::Timeout(_)
        )
    }
}

/// Maps a poisoned `RwLock`/`Mutex` into [`Error::Internal`].
pub fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Internal("lock poisoned".to_string())
}

pub type Result<T> = std::result::Result<T, Error>;
