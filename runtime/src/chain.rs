//! # AsyncTaskChain: Sequential Async Pipeline
//!
//! Runs an ordered list of async tasks one at a time. Each task receives the
//! previous task's result (`None` for the first) and the chain publishes its
//! progress through observable cells:
//!
//! * `active_index`: number of tasks that have completed
//! * `result`: latest successful result
//! * `error`: the [`ChainError`] that halted the chain, if any
//! * `status`: the [`ChainStatus`] state machine
//! * `task_states`: one [`TaskState`] per task
//!
//! ## Design Philosophy
//!
//! * **Builder pattern**: `AsyncTaskChain::builder("label").then(a).then(b).build(&scope)`
//! * **Strictly sequential**: task *n+1* is invoked only after task *n*'s
//!   outcome has been recorded
//! * **Halts on failure**: no task runs after a failed one

use crate::executor::{BoxFuture, Disposable, Liveness};
use crate::scope::Scope;
use parking_lot::Mutex;
use std::any::type_name;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tendril_core::config::ChainOptions;
use tendril_core::error::{ChainError, ConfigError};
use tendril_core::signal::{ObservableCell, Signal};
use tendril_core::status::{ChainStatus, TaskState};
use tendril_core::task::Task;
use tendril_core::timeline::{Timeline, TimelineEvent, now_millis};
use tracing::Instrument;

/// Executor type for one chain step: previous result in, next result out.
pub type TaskFn<T, E> = Arc<dyn Fn(Option<T>) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

type Hook<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// Helper to extract a readable type name from a type.
fn type_name_of<T: ?Sized>() -> String {
    let full = type_name::<T>();
    full.split("::").last().unwrap_or(full).to_string()
}

struct Step<T, E> {
    label: String,
    run: TaskFn<T, E>,
}

/// The chain builder. Nothing runs until [`ChainBuilder::build`].
pub struct ChainBuilder<T, E> {
    label: String,
    steps: Vec<Step<T, E>>,
    options: Option<ChainOptions>,
    on_finished: Option<Hook<Option<T>>>,
    on_error: Option<Hook<ChainError<E>>>,
}

impl<T, E> ChainBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Append a closure task.
    pub fn then<F, Fut>(mut self, task: F) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let label = format!("{}#{}", self.label, self.steps.len());
        let run: TaskFn<T, E> = Arc::new(move |previous| -> BoxFuture<'static, Result<T, E>> {
            Box::pin(task(previous))
        });
        self.steps.push(Step { label, run });
        self
    }

    /// Append a typed [`Task`].
    pub fn then_task<K>(mut self, task: K) -> Self
    where
        K: Task<T, Error = E>,
    {
        let label = type_name_of::<K>();
        let task = Arc::new(task);
        let run: TaskFn<T, E> = Arc::new(move |previous| -> BoxFuture<'static, Result<T, E>> {
            let task = task.clone();
            Box::pin(async move { task.run(previous).await })
        });
        self.steps.push(Step { label, run });
        self
    }

    pub fn options(mut self, options: ChainOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Called with the final result once every task has completed. An empty
    /// chain calls it with `None` from `build`.
    pub fn on_finished(mut self, hook: impl Fn(&Option<T>) + Send + Sync + 'static) -> Self {
        self.on_finished = Some(Arc::new(hook));
        self
    }

    /// Called when a task fails and halts the chain.
    pub fn on_error(mut self, hook: impl Fn(&ChainError<E>) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Build the chain and start it in the background.
    pub fn build(self, scope: &Scope) -> Result<AsyncTaskChain<T, E>, ConfigError> {
        let options = self.options.unwrap_or(scope.config().chain);
        options.validate()?;

        let signal = options.signal;
        let count = self.steps.len();
        let initial_status = if count == 0 {
            ChainStatus::Done
        } else {
            ChainStatus::Idle(0)
        };

        let chain = AsyncTaskChain {
            inner: Arc::new(ChainInner {
                label: self.label,
                active_index: scope.signal_with(0, signal)?,
                result: scope.signal_with(None, signal)?,
                error: scope.signal_with(None, signal)?,
                status: scope.signal_with(initial_status, signal)?,
                task_states: scope.signal_with(vec![TaskState::Pending; count], signal)?,
                timeline: Mutex::new(Timeline::new()),
                liveness: Liveness::new(),
                len: count,
            }),
        };

        if count == 0 {
            tracing::debug!(chain = %chain.inner.label, "empty chain done");
            if let Some(hook) = &self.on_finished {
                hook(&None);
            }
            return Ok(chain);
        }

        scope.adopt(&chain.inner);
        let runner = chain.clone();
        let steps = self.steps;
        let hooks = (self.on_finished, self.on_error);
        let span =
            tracing::info_span!("Chain", tendril.chain = %chain.inner.label, tendril.tasks = count);
        scope.spawn(Box::pin(runner.run(steps, hooks).instrument(span)));
        Ok(chain)
    }
}

struct ChainInner<T, E> {
    label: String,
    active_index: Signal<usize>,
    result: Signal<Option<T>>,
    error: Signal<Option<ChainError<E>>>,
    status: Signal<ChainStatus>,
    task_states: Signal<Vec<TaskState>>,
    timeline: Mutex<Timeline>,
    liveness: Liveness,
    len: usize,
}

impl<T, E> ChainInner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Move to `next` unless the status is already terminal.
    fn advance(&self, next: ChainStatus) -> bool {
        self.status.update_if(|status| {
            if status.is_terminal() {
                return false;
            }
            *status = next;
            true
        })
    }
}

impl<T, E> Disposable for ChainInner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    fn dispose(&self) {
        if !self.liveness.dispose() {
            return;
        }

        let mut aborted = None;
        self.status.update_if(|status| {
            if status.is_terminal() {
                return false;
            }
            let index = match *status {
                ChainStatus::Settled(i) => i + 1,
                other => other.index().unwrap_or(self.len),
            };
            *status = ChainStatus::Aborted(index);
            aborted = Some(index);
            true
        });

        if let Some(index) = aborted {
            self.task_states
                .set(aborted_from(self.task_states.get(), index));
            self.timeline.lock().push(TimelineEvent::Halted {
                index,
                timestamp: now_millis(),
            });
        }
        tracing::debug!(chain = %self.label, ?aborted, "chain disposed");
    }

    fn is_disposed(&self) -> bool {
        self.liveness.is_disposed()
    }

    fn is_finished(&self) -> bool {
        self.liveness.is_disposed() || self.status.peek(ChainStatus::is_terminal)
    }
}

/// A running (or finished) sequential task chain.
///
/// Cloning yields another handle to the same chain.
pub struct AsyncTaskChain<T, E> {
    inner: Arc<ChainInner<T, E>>,
}

impl<T, E> Clone for AsyncTaskChain<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> AsyncTaskChain<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Start defining a new chain.
    pub fn builder(label: &str) -> ChainBuilder<T, E> {
        ChainBuilder {
            label: label.to_string(),
            steps: Vec::new(),
            options: None,
            on_finished: None,
            on_error: None,
        }
    }

    /// Build and start a chain from a list of closure tasks.
    pub fn new<F, Fut>(scope: &Scope, tasks: Vec<F>) -> Result<Self, ConfigError>
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        tasks
            .into_iter()
            .fold(Self::builder("chain"), |builder, task| builder.then(task))
            .build(scope)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    pub fn active_index(&self) -> &Signal<usize> {
        &self.inner.active_index
    }

    pub fn result(&self) -> &Signal<Option<T>> {
        &self.inner.result
    }

    pub fn error(&self) -> &Signal<Option<ChainError<E>>> {
        &self.inner.error
    }

    pub fn status(&self) -> &Signal<ChainStatus> {
        &self.inner.status
    }

    pub fn task_states(&self) -> &Signal<Vec<TaskState>> {
        &self.inner.task_states
    }

    /// Copy of the events recorded so far.
    pub fn timeline(&self) -> Timeline {
        self.inner.timeline.lock().clone()
    }

    /// Stop the chain. The task in flight finishes unobserved and no further
    /// task is invoked. A chain that already reached a terminal status keeps it.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.liveness.is_disposed()
    }

    /// Wait for a terminal status: `Done`, `Failed` or `Aborted`.
    pub async fn finished(&self) -> ChainStatus {
        self.inner.status.wait_for(ChainStatus::is_terminal).await
    }

    async fn run(
        self,
        steps: Vec<Step<T, E>>,
        hooks: (Option<Hook<Option<T>>>, Option<Hook<ChainError<E>>>),
    ) {
        let (on_finished, on_error) = hooks;
        let inner = &self.inner;
        let mut previous: Option<T> = None;

        for (index, step) in steps.iter().enumerate() {
            if inner.liveness.is_disposed() || !inner.advance(ChainStatus::Running(index)) {
                return;
            }
            inner.timeline.lock().push(TimelineEvent::TaskEnter {
                index,
                label: step.label.clone(),
                timestamp: now_millis(),
            });

            let span =
                tracing::info_span!("Task", tendril.task = index, tendril.label = %step.label);
            let started = Instant::now();
            let outcome = async {
                tracing::debug!("entering task");
                (step.run)(previous.clone()).await
            }
            .instrument(span.clone())
            .await;
            let duration = started.elapsed();

            if inner.liveness.is_disposed() {
                tracing::debug!(index, "discarding task result of disposed chain");
                return;
            }

            match outcome {
                Ok(value) => {
                    tracing::info!(parent: &span, ?duration, "task fulfilled");
                    self.record_exit(index, TaskState::Fulfilled, duration.as_millis() as u64);
                    inner.result.set(Some(value.clone()));
                    previous = Some(value);
                    inner.active_index.set(index + 1);
                    if !inner.advance(ChainStatus::Settled(index)) {
                        return;
                    }
                }
                Err(cause) => {
                    tracing::error!(
                        parent: &span,
                        error = ?cause,
                        ?duration,
                        "task failed, chain halted"
                    );
                    self.record_exit(index, TaskState::Rejected, duration.as_millis() as u64);
                    inner.timeline.lock().push(TimelineEvent::Halted {
                        index,
                        timestamp: now_millis(),
                    });
                    inner
                        .task_states
                        .set(aborted_from(inner.task_states.get(), index + 1));

                    let error = ChainError::new(index, cause);
                    inner.error.set(Some(error.clone()));
                    if inner.advance(ChainStatus::Failed(index)) {
                        if let Some(hook) = &on_error {
                            hook(&error);
                        }
                    }
                    return;
                }
            }
        }

        if !inner.advance(ChainStatus::Done) {
            return;
        }
        tracing::info!("chain done");
        if let Some(hook) = &on_finished {
            hook(&inner.result.get());
        }
    }

    fn record_exit(&self, index: usize, state: TaskState, duration_ms: u64) {
        let outcome = match state {
            TaskState::Fulfilled => "fulfilled",
            _ => "rejected",
        };
        self.inner.timeline.lock().push(TimelineEvent::TaskExit {
            index,
            outcome: outcome.to_string(),
            duration_ms,
            timestamp: now_millis(),
        });
        self.inner.task_states.update_if(|states| match states.get_mut(index) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        });
    }
}

/// Mark every still-pending task from `from` onward as aborted.
fn aborted_from(mut states: Vec<TaskState>, from: usize) -> Vec<TaskState> {
    for state in states.iter_mut().skip(from) {
        if *state == TaskState::Pending {
            *state = TaskState::Aborted;
        }
    }
    states
}

impl<T, E> Disposable for AsyncTaskChain<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T: Debug, E: Debug> Debug for AsyncTaskChain<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskChain")
            .field("label", &self.inner.label)
            .field("active_index", &self.inner.active_index)
            .field("status", &self.inner.status)
            .field("result", &self.inner.result)
            .finish()
    }
}
