use thiserror::Error;

/// Core error types for supervisor operations
///
/// Only the start/stop precondition violations, config validation, and spawn
/// failure ever reach callers; everything that happens inside the reader loop
/// is recovered locally and surfaced as an `ERROR`-severity log event.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("a stream is already running")]
    AlreadyRunning,

    #[error("no stream is currently running")]
    NotRunning,

    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn encoder process: {0}")]
    Spawn(String),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    /// Check if this error is a start/stop precondition violation
    pub fn is_precondition(&self) -> bool {
        matches!(self, StreamError::AlreadyRunning | StreamError::NotRunning)
    }

    /// Check if this error indicates the session never left `Idle`
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, StreamError::InvalidConfig(_) | StreamError::Spawn(_))
    }
}
