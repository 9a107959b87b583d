//! # AsyncStateCell: Fire-and-Forget Async State
//!
//! Wraps one asynchronous computation and exposes its progress as four
//! observable cells:
//!
//! | cell | initial | after success | after failure |
//! |---|---|---|---|
//! | `value` | initial value | result | unchanged |
//! | `error` | `None` | `None` | `Some(e)` |
//! | `is_loading` | `true` | `false` | `false` |
//! | `is_ready` | `false` | `true` | unchanged |
//!
//! Construction starts the computation on the scope's spawner and returns
//! before it settles. Failures never reach the constructor's caller; they land
//! in `error`.
//!
//! ```rust,ignore
//! let scope = Scope::current()?;
//! let user = AsyncStateCell::new(&scope, || fetch_user(42), User::default())?;
//!
//! assert!(user.is_loading().get());
//! user.settled().await;
//! ```

use crate::executor::{BoxFuture, Disposable, Liveness};
use crate::scope::Scope;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tendril_core::config::{AsyncStateOptions, ReinvokePolicy};
use tendril_core::error::ConfigError;
use tendril_core::signal::{ObservableCell, Signal};
use tracing::Instrument;

type Computation<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type Hook<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// Point-in-time copy of all four fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncSnapshot<T, E> {
    pub value: T,
    pub error: Option<E>,
    pub is_loading: bool,
    pub is_ready: bool,
}

pub struct AsyncStateCell<T, E> {
    label: String,
    value: Signal<T>,
    error: Signal<Option<E>>,
    is_loading: Signal<bool>,
    is_ready: Signal<bool>,
    initial: T,
    computation: Computation<T, E>,
    options: AsyncStateOptions,
    // Bumped on every run; a result whose run id is stale is dropped.
    run_id: Arc<AtomicU64>,
    liveness: Arc<Liveness>,
    scope: Scope,
    on_success: Option<Hook<T>>,
    on_error: Option<Hook<E>>,
}

impl<T: Clone, E> Clone for AsyncStateCell<T, E> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            value: self.value.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading.clone(),
            is_ready: self.is_ready.clone(),
            initial: self.initial.clone(),
            computation: self.computation.clone(),
            options: self.options,
            run_id: self.run_id.clone(),
            liveness: self.liveness.clone(),
            scope: self.scope.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Builder for [`AsyncStateCell`]; options default to the scope's config.
pub struct AsyncStateBuilder<T, E> {
    label: String,
    computation: Computation<T, E>,
    initial: T,
    options: Option<AsyncStateOptions>,
    on_success: Option<Hook<T>>,
    on_error: Option<Hook<E>>,
}

impl<T, E> AsyncStateBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn options(mut self, options: AsyncStateOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&E) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn build(self, scope: &Scope) -> Result<AsyncStateCell<T, E>, ConfigError> {
        let options = self.options.unwrap_or(scope.config().state);
        options.validate()?;

        let signal = options.signal;
        let cell = AsyncStateCell {
            label: self.label,
            value: scope.signal_with(self.initial.clone(), signal)?,
            error: scope.signal_with(None, signal)?,
            is_loading: scope.signal_with(options.immediate, signal)?,
            is_ready: scope.signal_with(false, signal)?,
            initial: self.initial,
            computation: self.computation,
            options,
            run_id: Arc::new(AtomicU64::new(0)),
            liveness: Arc::new(Liveness::new()),
            scope: scope.clone(),
            on_success: self.on_success,
            on_error: self.on_error,
        };
        scope.adopt(&cell.liveness);

        if options.immediate {
            cell.start();
        }
        Ok(cell)
    }
}

impl<T, E> AsyncStateCell<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Create a cell with the scope's default options and start it.
    pub fn new<F, Fut>(scope: &Scope, computation: F, initial: T) -> Result<Self, ConfigError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::builder(computation, initial).build(scope)
    }

    pub fn builder<F, Fut>(computation: F, initial: T) -> AsyncStateBuilder<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let computation: Computation<T, E> =
            Arc::new(move || -> BoxFuture<'static, Result<T, E>> { Box::pin(computation()) });
        AsyncStateBuilder {
            label: "async-state".to_string(),
            computation,
            initial,
            options: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn value(&self) -> &Signal<T> {
        &self.value
    }

    pub fn error(&self) -> &Signal<Option<E>> {
        &self.error
    }

    pub fn is_loading(&self) -> &Signal<bool> {
        &self.is_loading
    }

    pub fn is_ready(&self) -> &Signal<bool> {
        &self.is_ready
    }

    pub fn snapshot(&self) -> AsyncSnapshot<T, E> {
        AsyncSnapshot {
            value: self.value.get(),
            error: self.error.get(),
            is_loading: self.is_loading.get(),
            is_ready: self.is_ready.get(),
        }
    }

    /// Run the computation again.
    ///
    /// Returns `false` when nothing was started: the cell is disposed, or a run
    /// is in flight under [`ReinvokePolicy::Ignore`].
    pub fn execute(&self) -> bool {
        if self.liveness.is_disposed() {
            tracing::debug!(cell = %self.label, "execute on disposed cell ignored");
            return false;
        }
        if self.options.policy == ReinvokePolicy::Ignore && self.is_loading.get() {
            tracing::debug!(cell = %self.label, "run in flight, execute ignored");
            return false;
        }

        if self.options.reset_on_execute {
            self.value.set(self.initial.clone());
        }
        self.start();
        true
    }

    /// Stop publishing. A run still in flight settles into nothing.
    pub fn dispose(&self) {
        if self.liveness.dispose() {
            tracing::debug!(cell = %self.label, "cell disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.liveness.is_disposed()
    }

    /// Wait until no run is in flight, then return a snapshot.
    ///
    /// A disposed cell returns at once; it will never settle again. Disposal
    /// while waiting also releases the wait.
    pub async fn settled(&self) -> AsyncSnapshot<T, E> {
        tokio::select! {
            _ = self.is_loading.wait_for(|loading| !loading) => {}
            _ = self.liveness.disposed() => {}
        }
        self.snapshot()
    }

    fn start(&self) {
        let run = self.run_id.fetch_add(1, Ordering::AcqRel) + 1;
        self.error.set(None);
        self.is_ready.set(false);
        self.is_loading.set(true);

        let cell = self.clone();
        let delay = self.options.delay();
        let span = tracing::info_span!("AsyncState", tendril.cell = %self.label, tendril.run = run);

        self.scope.spawn(Box::pin(
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if !cell.is_current(run) {
                    tracing::debug!("run superseded before start");
                    return;
                }

                tracing::debug!("computation started");
                let outcome = (cell.computation)().await;
                cell.settle(run, outcome);
            }
            .instrument(span),
        ));
    }

    fn is_current(&self, run: u64) -> bool {
        self.liveness.is_alive() && self.run_id.load(Ordering::Acquire) == run
    }

    fn settle(&self, run: u64, outcome: Result<T, E>) {
        if !self.is_current(run) {
            tracing::debug!(
                disposed = self.liveness.is_disposed(),
                "discarding late result"
            );
            return;
        }

        match outcome {
            Ok(value) => {
                self.value.set(value.clone());
                self.is_loading.set(false);
                self.is_ready.set(true);
                tracing::info!("computation resolved");
                if let Some(hook) = &self.on_success {
                    hook(&value);
                }
            }
            Err(error) => {
                tracing::warn!(error = ?error, "computation failed");
                self.error.set(Some(error.clone()));
                self.is_loading.set(false);
                if let Some(hook) = &self.on_error {
                    hook(&error);
                }
            }
        }
    }
}

impl<T, E> Disposable for AsyncStateCell<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    fn dispose(&self) {
        AsyncStateCell::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        AsyncStateCell::is_disposed(self)
    }
}

impl<T: Debug, E: Debug> Debug for AsyncStateCell<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStateCell")
            .field("label", &self.label)
            .field("value", &self.value)
            .field("error", &self.error)
            .field("is_loading", &self.is_loading)
            .field("is_ready", &self.is_ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_initial_fields_before_settle() {
        let scope = Scope::current().unwrap();
        let cell = AsyncStateCell::<u32, String>::new(&scope, || async { Ok(9) }, 0).unwrap();

        let snapshot = cell.snapshot();
        assert_eq!(snapshot.value, 0);
        assert_eq!(snapshot.error, None);
        assert!(snapshot.is_loading);
        assert!(!snapshot.is_ready);
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let scope = Scope::current().unwrap();
        let cell = AsyncStateCell::<u32, String>::new(&scope, || async { Ok(2) }, 0).unwrap();

        let json = serde_json::to_value(cell.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value": 0, "error": null, "is_loading": true, "is_ready": false})
        );
    }

    #[tokio::test]
    async fn test_not_immediate_waits_for_execute() {
        let scope = Scope::current().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let options = AsyncStateOptions {
            immediate: false,
            ..Default::default()
        };

        let cell = AsyncStateCell::<usize, String>::builder(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(n) }
            },
            0,
        )
        .options(options)
        .build(&scope)
        .unwrap();

        assert!(!cell.is_loading().get());
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(cell.execute());
        let snapshot = cell.settled().await;
        assert_eq!(snapshot.value, 1);
        assert!(snapshot.is_ready);
    }

    #[tokio::test]
    async fn test_ignore_policy_skips_second_execute() {
        let scope = Scope::current().unwrap();
        let (tx, rx) = oneshot::channel::<u32>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(rx)));

        let cell = AsyncStateCell::<u32, String>::new(
            &scope,
            move || {
                let rx = gate.lock().take();
                async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|e| e.to_string()),
                        None => Ok(0),
                    }
                }
            },
            0,
        )
        .unwrap();

        assert!(!cell.execute());
        tx.send(5).unwrap();
        assert_eq!(cell.settled().await.value, 5);
    }

    #[tokio::test]
    async fn test_restart_policy_discards_superseded_run() {
        let scope = Scope::current().unwrap();
        let (first_tx, first_rx) = oneshot::channel::<&'static str>();
        let (second_tx, second_rx) = oneshot::channel::<&'static str>();
        let gates = Arc::new(parking_lot::Mutex::new(vec![second_rx, first_rx]));
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let options = AsyncStateOptions {
            policy: ReinvokePolicy::Restart,
            ..Default::default()
        };

        let cell = AsyncStateCell::<&'static str, String>::builder(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let rx = gates.lock().pop();
                async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|e| e.to_string()),
                        None => Err("no gate".to_string()),
                    }
                }
            },
            "initial",
        )
        .options(options)
        .build(&scope)
        .unwrap();

        // Let the first run reach its gate before restarting.
        while started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(cell.execute());

        second_tx.send("second").unwrap();
        assert_eq!(cell.settled().await.value, "second");

        first_tx.send("first").unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cell.value().get(), "second");
    }

    #[tokio::test]
    async fn test_reset_on_execute() {
        let scope = Scope::current().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let cell = AsyncStateCell::<u32, String>::new(
            &scope,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(if n == 0 { 7 } else { 1 }) }
            },
            0,
        )
        .unwrap();
        assert_eq!(cell.settled().await.value, 7);

        assert!(cell.execute());
        assert_eq!(cell.value().get(), 0);
        assert!(!cell.is_ready().get());
        assert!(cell.is_loading().get());
        assert_eq!(cell.settled().await.value, 1);
    }

    #[tokio::test]
    async fn test_hooks_fire_after_state_update() {
        let scope = Scope::current().unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let cell = AsyncStateCell::<u32, String>::builder(|| async { Ok(3) }, 0)
            .on_success(move |v| sink.lock().push(*v))
            .build(&scope)
            .unwrap();

        cell.settled().await;
        assert_eq!(*seen.lock(), vec![3]);

        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = errors.clone();
        let failing =
            AsyncStateCell::<u32, String>::builder(|| async { Err("nope".to_string()) }, 0)
                .on_error(move |e| sink.lock().push(e.clone()))
                .build(&scope)
                .unwrap();

        failing.settled().await;
        assert_eq!(*errors.lock(), vec!["nope".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_defers_computation() {
        let scope = Scope::current().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let options = AsyncStateOptions {
            delay_ms: 100,
            ..Default::default()
        };

        let cell = AsyncStateCell::<u32, String>::builder(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            },
            0,
        )
        .options(options)
        .build(&scope)
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cell.is_loading().get());

        let snapshot = cell.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.value, 1);
    }

    #[tokio::test]
    async fn test_scope_dispose_silences_cell() {
        let scope = Scope::current().unwrap();
        let (tx, rx) = oneshot::channel::<u32>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(rx)));

        let cell = AsyncStateCell::<u32, String>::new(
            &scope,
            move || {
                let rx = gate.lock().take();
                async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|e| e.to_string()),
                        None => Ok(0),
                    }
                }
            },
            1,
        )
        .unwrap();

        tokio::task::yield_now().await;
        scope.dispose();
        assert!(cell.is_disposed());

        tx.send(2).unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cell.value().get(), 1);
        assert!(cell.is_loading().get());
        assert!(!cell.execute());
    }

    #[tokio::test]
    async fn test_settled_released_by_dispose_mid_wait() {
        let scope = Scope::current().unwrap();
        let (tx, rx) = oneshot::channel::<u32>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(rx)));

        let cell = AsyncStateCell::<u32, String>::new(
            &scope,
            move || {
                let rx = gate.lock().take();
                async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|e| e.to_string()),
                        None => Ok(0),
                    }
                }
            },
            1,
        )
        .unwrap();

        let waiter = cell.clone();
        let pending = tokio::spawn(async move { waiter.settled().await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        cell.dispose();
        let _ = tx.send(2);
        let snapshot = tokio::time::timeout(std::time::Duration::from_millis(500), pending)
            .await
            .expect("settled() must return after dispose")
            .unwrap();

        assert_eq!(snapshot.value, 1);
        assert!(snapshot.is_loading);
        assert!(!snapshot.is_ready);
    }

    #[tokio::test]
    async fn test_scope_releases_dropped_cells() {
        let scope = Scope::current().unwrap();
        for n in 0..50u32 {
            let cell = AsyncStateCell::<u32, String>::new(&scope, move || async move { Ok(n) }, 0)
                .unwrap();
            cell.settled().await;
        }
        tokio::task::yield_now().await;

        let kept = AsyncStateCell::<u32, String>::new(&scope, || async { Ok(1) }, 0).unwrap();
        kept.settled().await;
        assert_eq!(scope.tracked(), 1);

        scope.dispose();
        assert!(kept.is_disposed());
    }
}
