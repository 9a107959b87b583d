//! Scope - Owner of Cells and Chains
//!
//! A `Scope` is what a composable runs inside: it carries the spawner used for
//! fire-and-forget work, the scheduler observers flush on, and the default
//! options for everything created through it. Disposing a scope disposes every
//! cell and chain it created that is still reachable.
//!
//! The scope only holds weak handles: a finished chain or a cell nobody holds
//! any more is released instead of being kept alive until teardown.

use crate::executor::{BoxFuture, Disposable, Liveness, Spawn, TokioSpawner};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tendril_core::config::{SignalOptions, TendrilConfig};
use tendril_core::error::{ConfigError, SpawnError};
use tendril_core::scheduler::Scheduler;
use tendril_core::signal::Signal;

#[derive(Clone)]
pub struct Scope {
    spawner: Arc<dyn Spawn>,
    scheduler: Scheduler,
    config: TendrilConfig,
    liveness: Liveness,
    owned: Arc<Mutex<Vec<Weak<dyn Disposable>>>>,
}

impl Scope {
    pub fn new(spawner: impl Spawn) -> Self {
        Self {
            spawner: Arc::new(spawner),
            scheduler: Scheduler::new(),
            config: TendrilConfig::default(),
            liveness: Liveness::new(),
            owned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scope bound to the tokio runtime the caller is running on.
    pub fn current() -> Result<Self, SpawnError> {
        TokioSpawner::current().map(Self::new)
    }

    pub fn with_config(mut self, config: TendrilConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &TendrilConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// A standalone signal using the scope's default signal options.
    pub fn signal<T>(&self, value: T) -> Result<Signal<T>, ConfigError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.signal_with(value, self.config.signal)
    }

    pub fn signal_with<T>(&self, value: T, options: SignalOptions) -> Result<Signal<T>, ConfigError>
    where
        T: Clone + Send + Sync + 'static,
    {
        Signal::new(value, options, self.scheduler.clone())
    }

    pub fn is_disposed(&self) -> bool {
        self.liveness.is_disposed()
    }

    /// Dispose this scope and everything created through it.
    pub fn dispose(&self) {
        if !self.liveness.dispose() {
            return;
        }
        let owned = std::mem::take(&mut *self.owned.lock());
        tracing::debug!(owned = owned.len(), "disposing scope");
        for construct in owned.iter().filter_map(Weak::upgrade) {
            construct.dispose();
        }
    }

    /// Constructs this scope would still dispose on teardown.
    pub fn tracked(&self) -> usize {
        let mut owned = self.owned.lock();
        prune(&mut owned);
        owned.len()
    }

    pub(crate) fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.spawner.spawn(future);
    }

    /// Take over a construct's teardown. A construct adopted by a disposed
    /// scope is disposed on the spot.
    pub fn adopt<D: Disposable>(&self, construct: &Arc<D>) {
        if self.liveness.is_disposed() {
            construct.dispose();
            return;
        }
        let weak: Weak<dyn Disposable> = Arc::<D>::downgrade(construct);
        let mut owned = self.owned.lock();
        prune(&mut owned);
        owned.push(weak);
    }
}

fn prune(owned: &mut Vec<Weak<dyn Disposable>>) {
    owned.retain(|weak| weak.upgrade().is_some_and(|c| !c.is_finished()));
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("config", &self.config)
            .field("disposed", &self.is_disposed())
            .field("tracked", &self.tracked())
            .finish()
    }
}
