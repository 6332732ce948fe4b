//! Error types for engine operations.

use thiserror::Error;

/// Errors produced by the planning and execution stages.
///
/// Running short on capacity is never one of these: the calculator and
/// allocator scale down instead, and the executor skips and retries.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Host or target data is missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Engine configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Reading or writing a handoff file failed.
    #[error("io error: {0}")]
    Io(String),
    /// A handoff file could not be decoded or encoded.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
