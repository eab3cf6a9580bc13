//! Cancellation tokens and the context handed to cancellable loaders.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SysdashError;

/// Longest stretch of work a cancellable loader may do between two
/// [`TaskContext::is_cancelled`] checks.
pub const CANCEL_POLL_GRANULARITY: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared by a task and whoever may cancel it.
///
/// Tokens form a tree: a [`child_token`](CancellationToken::child_token) is
/// cancelled along with every ancestor, so nested work (one token per
/// subdirectory, say) stops when any enclosing scope is cancelled.
pub use tokio_util::sync::CancellationToken;

/// `?`-friendly cancellation check for loaders.
pub trait CancelCheck {
    /// `Err(SysdashError::Cancelled)` once cancelled.
    fn check(&self) -> Result<(), SysdashError>;
}

impl CancelCheck for CancellationToken {
    fn check(&self) -> Result<(), SysdashError> {
        if self.is_cancelled() {
            Err(SysdashError::Cancelled)
        } else {
            Ok(())
        }
    }
}

type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Handed to cancellable loaders: the cancellation token plus a progress channel.
#[derive(Clone)]
pub struct TaskContext {
    token: CancellationToken,
    progress: Option<ProgressSink>,
}

impl TaskContext {
    pub(crate) fn new(token: CancellationToken, progress: Option<ProgressSink>) -> Self {
        Self { token, progress }
    }

    /// A context that is never cancelled by anyone else and drops progress
    /// reports. Useful for running a cancellable collector synchronously.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    /// Context that observes `token` and drops progress reports.
    pub fn with_token(token: CancellationToken) -> Self {
        Self::new(token, None)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), SysdashError> {
        self.token.check()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Report progress in percent (values above 100 are clamped).
    /// Ignored once the task is cancelled.
    pub fn report_progress(&self, percent: u8) {
        if self.is_cancelled() {
            return;
        }
        if let Some(sink) = &self.progress {
            sink(percent.min(100));
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("token", &self.token)
            .field("reports_progress", &self.progress.is_some())
            .finish()
    }
}
