//! Memoizing cache around a one-shot background load.
//!
//! A [`Cache`] owns a loader, runs it on the [`WorkerPool`] when asked, keeps
//! the last good value and tells subscribers about every state change. All
//! notifications are raised on the presentation thread: load completions
//! arrive through the pool's dispatcher, and `load`/`refresh`/`clear` notify
//! on whichever thread calls them (normally the presentation thread too).
//!
//! # Examples
//!
//! ```no_run
//! use sysdash::core::cache::{Cache, CacheEvent};
//! use sysdash::core::tasks::{dispatch, WorkerPool};
//! use std::time::Duration;
//!
//! let (dispatcher, event_loop) = dispatch::channel();
//! let pool = WorkerPool::new(dispatcher)?;
//!
//! let drives = Cache::builder(pool, || Ok(vec!["C:".to_string()]))
//!     .name("drives")
//!     .fallback(Vec::new())
//!     .build();
//!
//! drives.subscribe(|event| {
//!     if let CacheEvent::DataLoaded(list) = event {
//!         println!("{} drives", list.len());
//!     }
//! });
//! drives.load();
//! event_loop.run_for(Duration::from_millis(100));
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::tasks::{TaskEvent, WorkerPool};
use crate::error::SysdashError;

/// Lifecycle of a [`Cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheState {
    /// Nothing loaded yet, or cleared.
    Idle,
    Loading,
    Loaded,
    /// The last load failed. A previously loaded value may still be served.
    Error,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheState::Idle => "idle",
            CacheState::Loading => "loading",
            CacheState::Loaded => "loaded",
            CacheState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Notification sent to cache subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent<T> {
    StateChanged(CacheState),
    DataLoaded(T),
    ErrorOccurred(String),
}

/// Behaviour switches for the two races a plain cache leaves open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Give up on a load after this long: the cache enters `Error` and the
    /// late result, if it ever arrives, is dropped.
    pub load_timeout: Option<Duration>,
    /// Drop the result of a load that was in flight when `clear()` ran.
    /// Off by default: such a result is applied as usual.
    pub discard_cleared_loads: bool,
}

type Loader<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;
type Observer<T> = Arc<dyn Fn(&CacheEvent<T>) + Send + Sync>;

/// Identifies a subscription for [`Cache::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Slot<T> {
    value: Option<T>,
    error: Option<String>,
    state: CacheState,
    /// Ticket of the load whose result may still be applied.
    generation: u64,
}

struct CacheInner<T> {
    name: String,
    pool: WorkerPool,
    loader: Loader<T>,
    fallback: Option<T>,
    options: CacheOptions,
    slot: Mutex<Slot<T>>,
    observers: Mutex<Vec<(SubscriptionId, Observer<T>)>>,
    next_subscription: AtomicU64,
    loads_started: AtomicU64,
}

/// Background-loaded, memoized value with observable state.
///
/// Cloning yields another handle to the same cache.
pub struct Cache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder returned by [`Cache::builder`].
pub struct CacheBuilder<T> {
    name: String,
    pool: WorkerPool,
    loader: Loader<T>,
    fallback: Option<T>,
    options: CacheOptions,
}

impl<T> CacheBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Name used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Value returned by `get(true)` until a load succeeds.
    pub fn fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.options.load_timeout = Some(timeout);
        self
    }

    pub fn discard_cleared_loads(mut self, discard: bool) -> Self {
        self.options.discard_cleared_loads = discard;
        self
    }

    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Cache<T> {
        Cache {
            inner: Arc::new(CacheInner {
                name: self.name,
                pool: self.pool,
                loader: self.loader,
                fallback: self.fallback,
                options: self.options,
                slot: Mutex::new(Slot {
                    value: None,
                    error: None,
                    state: CacheState::Idle,
                    generation: 0,
                }),
                observers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                loads_started: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> Cache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Cache without fallback and with default options.
    pub fn new<F>(pool: WorkerPool, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::builder(pool, loader).build()
    }

    pub fn builder<F>(pool: WorkerPool, loader: F) -> CacheBuilder<T>
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        CacheBuilder {
            name: "cache".to_string(),
            pool,
            loader: Arc::new(loader),
            fallback: None,
            options: CacheOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    pub fn state(&self) -> CacheState {
        self.inner.slot.lock().state
    }

    pub fn is_loading(&self) -> bool {
        self.state() == CacheState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == CacheState::Loaded
    }

    pub fn has_error(&self) -> bool {
        self.state() == CacheState::Error
    }

    /// How many loader tasks this cache has submitted.
    pub fn loads_started(&self) -> u64 {
        self.inner.loads_started.load(Ordering::Acquire)
    }

    /// Last loaded value; otherwise the fallback when `use_fallback` is set.
    ///
    /// Never waits for a load and never starts one.
    pub fn get(&self, use_fallback: bool) -> Option<T> {
        let slot = self.inner.slot.lock();
        match &slot.value {
            Some(value) => Some(value.clone()),
            None if use_fallback => self.inner.fallback.clone(),
            None => None,
        }
    }

    pub fn get_error(&self) -> Option<String> {
        self.inner.slot.lock().error.clone()
    }

    /// Register `observer`; it runs for every subsequent event.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent<T>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    /// Start a background load unless one is already running.
    ///
    /// Returns whether a load was started.
    pub fn load(&self) -> bool {
        let ticket = {
            let mut slot = self.inner.slot.lock();
            if slot.state == CacheState::Loading {
                log::trace!("Cache '{}': load already in flight", self.inner.name);
                return false;
            }
            slot.generation += 1;
            slot.state = CacheState::Loading;
            slot.generation
        };

        log::debug!("Cache '{}': loading (ticket {})", self.inner.name, ticket);
        self.emit(CacheEvent::StateChanged(CacheState::Loading));
        self.spawn_load(ticket);
        true
    }

    /// Forget the last error and load again.
    ///
    /// The current value stays readable until the new load resolves: a
    /// successful load replaces it, a failed one leaves it in place so `get()`
    /// keeps serving stale data next to the error.
    pub fn refresh(&self) -> bool {
        self.inner.slot.lock().error = None;
        self.load()
    }

    /// Drop value and error and return to `Idle`.
    ///
    /// An in-flight load is not cancelled. Its result is applied when it
    /// arrives unless the cache was built with `discard_cleared_loads`.
    pub fn clear(&self) {
        {
            let mut slot = self.inner.slot.lock();
            slot.value = None;
            slot.error = None;
            slot.state = CacheState::Idle;
            if self.inner.options.discard_cleared_loads {
                slot.generation += 1;
            }
        }

        log::debug!("Cache '{}': cleared", self.inner.name);
        self.emit(CacheEvent::StateChanged(CacheState::Idle));
    }

    fn spawn_load(&self, ticket: u64) {
        self.inner.loads_started.fetch_add(1, Ordering::AcqRel);

        let loader = Arc::clone(&self.inner.loader);
        let cache = self.clone();
        self.inner.pool.submit(
            move || (*loader)(),
            move |event| match event {
                TaskEvent::Result(value) => cache.on_loaded(ticket, value),
                TaskEvent::Error(message) => cache.on_failed(ticket, message),
                TaskEvent::Progress(_) | TaskEvent::Finished => {}
            },
        );

        if let Some(timeout) = self.inner.options.load_timeout {
            let cache = self.clone();
            self.inner
                .pool
                .post_after(timeout, move || cache.on_deadline(ticket, timeout));
        }
    }

    fn on_loaded(&self, ticket: u64, value: T) {
        {
            let mut slot = self.inner.slot.lock();
            if slot.generation != ticket {
                log::debug!(
                    "Cache '{}': discarding superseded result (ticket {})",
                    self.inner.name,
                    ticket
                );
                return;
            }
            slot.value = Some(value.clone());
            slot.error = None;
            slot.state = CacheState::Loaded;
        }

        log::debug!("Cache '{}': loaded", self.inner.name);
        self.emit(CacheEvent::StateChanged(CacheState::Loaded));
        self.emit(CacheEvent::DataLoaded(value));
    }

    fn on_failed(&self, ticket: u64, message: String) {
        {
            let mut slot = self.inner.slot.lock();
            if slot.generation != ticket {
                return;
            }
            slot.error = Some(message.clone());
            slot.state = CacheState::Error;
        }

        log::warn!("Cache '{}': load failed: {}", self.inner.name, message);
        self.emit(CacheEvent::StateChanged(CacheState::Error));
        self.emit(CacheEvent::ErrorOccurred(message));
    }

    fn on_deadline(&self, ticket: u64, timeout: Duration) {
        let message = {
            let mut slot = self.inner.slot.lock();
            if slot.generation != ticket || slot.state != CacheState::Loading {
                return;
            }
            let message =
                SysdashError::timeout(format!("loading '{}'", self.inner.name), timeout).to_string();
            // Invalidate the ticket so the eventual result is ignored.
            slot.generation += 1;
            slot.error = Some(message.clone());
            slot.state = CacheState::Error;
            message
        };

        log::warn!("Cache '{}': {}", self.inner.name, message);
        self.emit(CacheEvent::StateChanged(CacheState::Error));
        self.emit(CacheEvent::ErrorOccurred(message));
    }

    /// Invoke observers outside every lock so handlers may call back in.
    fn emit(&self, event: CacheEvent<T>) {
        let observers: Vec<Observer<T>> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(&event);
        }
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("state", &slot.state)
            .field("has_value", &slot.value.is_some())
            .field("error", &slot.error)
            .finish()
    }
}
