//! Error types for Mailguard

/// Result type alias using Mailguard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Mailguard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed scan request or email record
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An external analysis capability (scorer, reasoning agent) is
    /// unreachable or timed out. Recovered by degrading to the next stage.
    #[error("stage unavailable: {0}")]
    StageUnavailable(String),

    /// Document or session store errors
    #[error("store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new stage-unavailable error
    pub fn stage_unavailable(msg: impl Into<String>) -> Self {
        Self::StageUnavailable(msg.into())
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is recoverable inside the pipeline (the scan
    /// degrades to the next stage rather than failing the request)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StageUnavailable(_) | Self::Timeout)
    }
}
