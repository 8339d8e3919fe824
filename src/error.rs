use thiserror::Error;

/// Main error type for the reader engine.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// The pagination backend could not be reached or rejected the call.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend answered but reported a failure (e.g. a parse error).
    #[error("Backend reported: {0}")]
    BackendReported(String),

    /// A highlight or bookmark mutation failed to persist. Retryable.
    #[error("Failed to persist {command}: {message}")]
    Mutation {
        /// Name of the command that failed.
        command: String,
        /// Underlying failure.
        message: String,
    },

    /// Persistence layer error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller passed something the engine cannot act on.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Page markup could not be parsed.
    #[error("Markup error: {0}")]
    Markup(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReaderError {
    /// Whether replaying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReaderError::Mutation { .. } | ReaderError::Backend(_) | ReaderError::Storage(_)
        )
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, ReaderError>;
