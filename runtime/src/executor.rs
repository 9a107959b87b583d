//! Executor - Fire-and-Forget Dispatch
//!
//! Cells and chains never await their own work. They hand a boxed future to a
//! [`Spawn`] implementation and return immediately; the future runs as a
//! detached task on whatever runtime the spawner drives.

use std::future::Future;
use std::pin::Pin;
use tendril_core::error::SpawnError;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Type alias for async boxed futures handed to a spawner.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Detached task dispatch.
pub trait Spawn: Send + Sync + 'static {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

/// Spawns onto a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime the caller is running on.
    pub fn current() -> Result<Self, SpawnError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| SpawnError::NoRuntime)
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        // Detached: the JoinHandle is dropped, the task keeps running.
        drop(self.handle.spawn(future));
    }
}

/// Something a `Scope` can dispose on teardown.
pub trait Disposable: Send + Sync + 'static {
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    /// Nothing left for a scope to tear down; it may stop tracking this.
    fn is_finished(&self) -> bool {
        self.is_disposed()
    }
}

/// Disposal flag shared between a construct and its background work.
///
/// Background work checks it before every write to observable state; waiters
/// can also await the flip with [`Liveness::disposed`].
#[derive(Debug, Clone)]
pub struct Liveness {
    disposed: watch::Sender<bool>,
}

impl Liveness {
    pub fn new() -> Self {
        let (disposed, _) = watch::channel(false);
        Self { disposed }
    }

    pub fn is_alive(&self) -> bool {
        !*self.disposed.borrow()
    }

    pub fn is_disposed(&self) -> bool {
        !self.is_alive()
    }

    /// Returns `true` if this call performed the disposal.
    pub fn dispose(&self) -> bool {
        self.disposed.send_if_modified(|disposed| {
            if *disposed {
                return false;
            }
            *disposed = true;
            true
        })
    }

    /// Resolves once [`Liveness::dispose`] has been called.
    pub async fn disposed(&self) {
        let mut rx = self.disposed.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|disposed| *disposed).await;
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for Liveness {
    fn dispose(&self) {
        Liveness::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Liveness::is_disposed(self)
    }
}
