//! Error types for AiGuard

/// Result type alias using AiGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for AiGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Policy loading or evaluation errors
    #[error("policy error: {0}")]
    Policy(String),

    /// Stream processing errors
    #[error("stream error: {0}")]
    Stream(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Text-source (generator) failures
    #[error("generator error: {0}")]
    Generator(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new policy error
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new generator error
    pub fn generator(msg: impl Into<String>) -> Self {
        Self::Generator(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
