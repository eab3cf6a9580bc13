//! Presentation-thread message queue.
//!
//! Worker threads never call consumer callbacks directly. They post closures
//! through a [`Dispatcher`]; whichever thread owns the matching [`EventLoop`]
//! runs them, in posting order, when it drains the queue.

use std::sync::mpsc;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send>;

/// Create a connected dispatcher/event-loop pair.
pub fn channel() -> (Dispatcher, EventLoop) {
    let (tx, rx) = mpsc::channel();
    (Dispatcher { tx }, EventLoop { rx })
}

/// Cloneable handle used by workers to hand work back to the presentation thread.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Queue `job` for the presentation thread. Never blocks.
    ///
    /// Returns `false` when the event loop has been dropped; the job is discarded.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Receiving end of the queue, owned by the presentation thread.
pub struct EventLoop {
    rx: mpsc::Receiver<Job>,
}

impl EventLoop {
    /// Run every job queued so far without waiting. Returns how many ran.
    pub fn process_events(&self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Keep running jobs as they arrive until `duration` has elapsed.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut count = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(job) => {
                    job();
                    count += 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                // All dispatchers gone: nothing can ever arrive.
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        count + self.process_events()
    }

    /// Run jobs until `done()` holds or `timeout` expires.
    ///
    /// The predicate is evaluated before waiting and after every job.
    /// Returns whether the predicate was satisfied.
    pub fn run_until<P>(&self, timeout: Duration, mut done: P) -> bool
    where
        P: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;

        loop {
            self.process_events();
            if done() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            match self.rx.recv_timeout(remaining) {
                Ok(job) => job(),
                Err(mpsc::RecvTimeoutError::Timeout) => return done(),
                Err(mpsc::RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }
}
