use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom error type for the sysdash runtime
#[derive(Error, Debug)]
pub enum SysdashError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The loader itself failed; only the rendered message survives the task boundary.
    #[error("{0}")]
    Collector(String),

    #[error("Timed out after {}ms: {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    /// Raised by a loader that observed its cancellation token. Never surfaced
    /// as an error notification.
    #[error("Task cancelled")]
    Cancelled,

    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// Result type alias for sysdash
pub type Result<T> = std::result::Result<T, SysdashError>;

impl SysdashError {
    /// Create a collector error
    pub fn collector<S: Into<String>>(msg: S) -> Self {
        SysdashError::Collector(msg.into())
    }

    pub fn timeout<S: Into<String>>(what: S, after: Duration) -> Self {
        SysdashError::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn pool<S: Into<String>>(msg: S) -> Self {
        SysdashError::Pool(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SysdashError::Cancelled)
    }
}
