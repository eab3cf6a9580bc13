//! Cancellable one-shot tasks: cooperative cancellation with a `Finished`-only ending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{run_guarded, CancellationToken, Notifier, Outcome, TaskContext, TaskEvent, WorkerPool};

/// Handle to a cancellable task.
///
/// Cancelling is advisory: the loader notices at its next
/// [`TaskContext::is_cancelled`] check. Once cancelled, the task's `Result`,
/// `Error` and `Progress` events are suppressed; `Finished` is still delivered.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: u64,
    token: CancellationToken,
    completed: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        log::debug!("Cancellable task #{} cancel requested", self.id);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The loader has returned (it may still be waiting for delivery).
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl WorkerPool {
    /// Run a loader that polls a cancellation token.
    pub fn submit_cancellable<T, F, H>(&self, loader: F, on_event: H) -> CancelHandle
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> anyhow::Result<T> + Send + 'static,
        H: FnMut(TaskEvent<T>) + Send + 'static,
    {
        self.submit_cancellable_with_token(CancellationToken::new(), loader, on_event)
    }

    /// Like [`submit_cancellable`](Self::submit_cancellable), observing an
    /// existing token. Pass `parent.child_token()` to tie the task to a wider scope.
    pub fn submit_cancellable_with_token<T, F, H>(
        &self,
        token: CancellationToken,
        loader: F,
        on_event: H,
    ) -> CancelHandle
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> anyhow::Result<T> + Send + 'static,
        H: FnMut(TaskEvent<T>) + Send + 'static,
    {
        let id = self.next_task_id();
        let notifier = Notifier::new(self.dispatcher().clone(), on_event);
        let completed = Arc::new(AtomicBool::new(false));
        let active = self.track_active();

        let progress_notifier = notifier.clone();
        let progress_token = token.clone();
        let ctx = TaskContext::new(
            token.clone(),
            Some(Arc::new(move |percent: u8| {
                let gate = progress_token.clone();
                progress_notifier.emit_if(TaskEvent::Progress(percent), move || {
                    !gate.is_cancelled()
                });
            })),
        );

        let task_token = token.clone();
        let task_completed = Arc::clone(&completed);
        self.blocking_handle().spawn_blocking(move || {
            let outcome = if task_token.is_cancelled() {
                Outcome::Cancelled
            } else {
                run_guarded(|| loader(&ctx))
            };
            drop(active);
            task_completed.store(true, Ordering::Release);

            let outcome = if task_token.is_cancelled() {
                log::debug!("Cancellable task #{} exited after cancellation", id);
                Outcome::Cancelled
            } else {
                outcome
            };

            let gate = task_token.clone();
            notifier.emit_outcome(outcome, move || !gate.is_cancelled());
            notifier.emit(TaskEvent::Finished);
        });

        CancelHandle {
            id,
            token,
            completed,
        }
    }
}
