//! Signal - Observable Cell
//!
//! The reactive capability async state is built on: a value that can be read
//! at any time, written, and observed.
//!
//! Storage and async notification use a `tokio::sync::watch` channel, so any
//! number of tasks can `subscribe()` and await changes. Synchronous observers
//! register callbacks with `observe()`; when those run is set by the signal's
//! [`FlushTiming`].

use crate::config::{FlushTiming, SignalOptions};
use crate::error::{ConfigError, SignalError};
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::watch;

pub type ObserverId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Read/write/notify capability consumed by the async primitives.
///
/// It deliberately has no dependency tracking: reading never registers the
/// reader anywhere.
pub trait ObservableCell<T: Clone> {
    /// Current value.
    fn get(&self) -> T;

    /// Borrow the current value without cloning it.
    fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Replace the value and notify every observer.
    fn set(&self, value: T);

    /// Mutate in place. Observers are only notified when the cell is deep.
    fn update(&self, f: impl FnOnce(&mut T));

    /// Async change stream.
    fn subscribe(&self) -> Result<watch::Receiver<T>, SignalError>;

    /// Register a callback run after each notifying write.
    fn observe<F>(&self, callback: F) -> Result<ObserverId, SignalError>
    where
        F: Fn(&T) + Send + Sync + 'static;

    /// Remove a callback. Returns `false` if `id` was not registered.
    fn unobserve(&self, id: ObserverId) -> bool;
}

struct SignalInner<T> {
    tx: watch::Sender<T>,
    observers: Mutex<Vec<(ObserverId, Callback<T>)>>,
    next_id: AtomicU64,
    // Set while a deferred observer job is queued, so bursts of writes coalesce.
    queued: AtomicBool,
    // Receivers held by `wait_for`; excluded from the capacity count.
    waiters: AtomicUsize,
    options: SignalOptions,
    scheduler: Scheduler,
}

/// Default [`ObservableCell`] implementation.
///
/// Cloning a `Signal` yields another handle to the same cell.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        value: T,
        options: SignalOptions,
        scheduler: Scheduler,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let (tx, _rx) = watch::channel(value);
        Ok(Self {
            inner: Arc::new(SignalInner {
                tx,
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                queued: AtomicBool::new(false),
                waiters: AtomicUsize::new(0),
                options,
                scheduler,
            }),
        })
    }

    pub fn options(&self) -> &SignalOptions {
        &self.inner.options
    }

    /// Observers currently registered, subscribers included.
    pub fn observer_count(&self) -> usize {
        let waiters = self.inner.waiters.load(Ordering::Acquire);
        let subscribers = self.inner.tx.receiver_count().saturating_sub(waiters);
        self.inner.observers.lock().len() + subscribers
    }

    /// Wait until `predicate` holds for the current value, returning that value.
    ///
    /// Uses a temporary receiver that does not count against `capacity`.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&T) -> bool) -> T {
        // Declared before `rx` so the receiver is dropped first.
        let _waiter = WaiterGuard::new(&self.inner.waiters);
        let mut rx = self.inner.tx.subscribe();
        match rx.wait_for(|value| predicate(value)).await {
            Ok(value) => value.clone(),
            // The sender lives as long as `self`, so the channel cannot close here.
            Err(_) => self.get(),
        }
    }

    /// Mutate in place, notifying observers only when `f` returns `true`.
    ///
    /// `f` runs under the cell's write lock, so the check and the write are
    /// atomic with respect to other writers.
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let modified = self.inner.tx.send_if_modified(f);
        if modified {
            self.notify();
        }
        modified
    }

    fn check_capacity(&self) -> Result<(), SignalError> {
        match self.inner.options.capacity {
            Some(capacity) if self.observer_count() >= capacity => {
                Err(SignalError::CapacityExceeded { capacity })
            }
            _ => Ok(()),
        }
    }

    fn notify(&self) {
        if self.inner.observers.lock().is_empty() {
            return;
        }

        match self.inner.options.flush {
            FlushTiming::Sync => self.run_observers(),
            timing => {
                if self.inner.queued.swap(true, Ordering::AcqRel) {
                    return;
                }
                let signal = self.clone();
                self.inner.scheduler.enqueue(timing, move || {
                    signal.inner.queued.store(false, Ordering::Release);
                    signal.run_observers();
                });
            }
        }
    }

    fn run_observers(&self) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        // Snapshot first: callbacks are free to write back into this signal.
        let value = self.inner.tx.borrow().clone();
        for callback in callbacks {
            callback(&value);
        }
    }
}

impl<T> ObservableCell<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.inner.tx.borrow().clone()
    }

    fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.tx.borrow())
    }

    fn set(&self, value: T) {
        self.inner.tx.send_replace(value);
        self.notify();
    }

    fn update(&self, f: impl FnOnce(&mut T)) {
        if self.inner.options.deep {
            self.inner.tx.send_modify(f);
            self.notify();
        } else {
            self.inner.tx.send_if_modified(|value| {
                f(value);
                false
            });
        }
    }

    fn subscribe(&self) -> Result<watch::Receiver<T>, SignalError> {
        self.check_capacity()?;
        Ok(self.inner.tx.subscribe())
    }

    fn observe<F>(&self, callback: F) -> Result<ObserverId, SignalError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.check_capacity()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.lock().push((id, Arc::new(callback)));
        Ok(id)
    }

    fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn new(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::AcqRel);
        Self(waiters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.inner.tx.borrow())
            .field("options", &self.inner.options)
            .finish()
    }
}
