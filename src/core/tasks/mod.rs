//! Background task runtime.
//!
//! Blocking collectors run on the [`WorkerPool`]; their outcomes travel back to
//! the presentation thread as [`TaskEvent`]s through a [`Dispatcher`]. Three
//! execution modes exist: one-shot ([`WorkerPool::submit`]), periodic
//! ([`WorkerPool::start_periodic`]) and cancellable
//! ([`WorkerPool::submit_cancellable`]).

mod cancellable;
pub mod dispatch;
mod periodic;
mod pool;
mod token;

pub use cancellable::CancelHandle;
pub use dispatch::{Dispatcher, EventLoop};
pub use periodic::PeriodicHandle;
pub use pool::{PoolConfig, WorkerPool};
pub use token::{CancelCheck, CancellationToken, TaskContext, CANCEL_POLL_GRANULARITY};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::SysdashError;

/// Notification emitted by a task, always delivered on the presentation thread.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent<T> {
    /// The loader returned a value.
    Result(T),
    /// The loader failed or panicked; only the message is kept.
    Error(String),
    /// Progress in percent, reported by cancellable loaders.
    Progress(u8),
    /// Terminal notification. Sent exactly once per task.
    Finished,
}

impl<T> TaskEvent<T> {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskEvent::Finished)
    }
}

/// What a single loader invocation produced.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Value(T),
    Failed(String),
    Cancelled,
}

/// Invoke a loader, converting errors and panics into an [`Outcome`].
pub(crate) fn run_guarded<T, F>(loader: F) -> Outcome<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(loader)) {
        Ok(Ok(value)) => Outcome::Value(value),
        Ok(Err(err)) => {
            if err
                .downcast_ref::<SysdashError>()
                .is_some_and(SysdashError::is_cancelled)
            {
                Outcome::Cancelled
            } else {
                Outcome::Failed(format!("{err:#}"))
            }
        }
        Err(payload) => Outcome::Failed(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("loader panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("loader panicked: {msg}")
    } else {
        "loader panicked".to_string()
    }
}

type Handler<T> = Box<dyn FnMut(TaskEvent<T>) + Send>;

/// Routes events of one task to its handler on the presentation thread.
pub(crate) struct Notifier<T> {
    dispatcher: Dispatcher,
    handler: Arc<Mutex<Handler<T>>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T: Send + 'static> Notifier<T> {
    pub(crate) fn new<H>(dispatcher: Dispatcher, handler: H) -> Self
    where
        H: FnMut(TaskEvent<T>) + Send + 'static,
    {
        Self {
            dispatcher,
            handler: Arc::new(Mutex::new(Box::new(handler))),
        }
    }

    /// Post `event`; `wanted` is re-checked on the presentation thread right
    /// before the handler runs.
    pub(crate) fn emit_if<G>(&self, event: TaskEvent<T>, wanted: G)
    where
        G: FnOnce() -> bool + Send + 'static,
    {
        let handler = Arc::clone(&self.handler);
        self.dispatcher.post(move || {
            if wanted() {
                (handler.lock())(event);
            }
        });
    }

    pub(crate) fn emit(&self, event: TaskEvent<T>) {
        self.emit_if(event, || true);
    }

    /// Post the events for `outcome`. Cancelled outcomes produce nothing.
    pub(crate) fn emit_outcome<G>(&self, outcome: Outcome<T>, wanted: G)
    where
        G: FnOnce() -> bool + Send + 'static,
    {
        match outcome {
            Outcome::Value(value) => self.emit_if(TaskEvent::Result(value), wanted),
            Outcome::Failed(message) => self.emit_if(TaskEvent::Error(message), wanted),
            Outcome::Cancelled => {}
        }
    }
}
