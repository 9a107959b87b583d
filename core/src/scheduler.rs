//! Scheduler - Deferred Observer Flushing
//!
//! Observer callbacks registered with a `Pre` or `Post` flush timing do not run
//! inside the write that triggered them. They are queued here and drained in a
//! single pass: every pre job first, then post jobs, until both queues are
//! empty.
//!
//! The first enqueue arms an automatic flush on the ambient tokio runtime. With
//! no runtime available, jobs wait for an explicit [`Scheduler::flush`].

use crate::config::FlushTiming;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SchedulerInner {
    pre: Mutex<VecDeque<Job>>,
    post: Mutex<VecDeque<Job>>,
    armed: AtomicBool,
}

/// Shared pre/post job queue. Cloning yields a handle to the same queues.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job. `FlushTiming::Sync` runs it immediately instead.
    pub fn enqueue<F>(&self, timing: FlushTiming, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match timing {
            FlushTiming::Sync => {
                job();
                return;
            }
            FlushTiming::Pre => self.inner.pre.lock().push_back(Box::new(job)),
            FlushTiming::Post => self.inner.post.lock().push_back(Box::new(job)),
        }
        self.arm();
    }

    fn arm(&self) {
        if self.inner.armed.swap(true, Ordering::AcqRel) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let scheduler = self.clone();
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    scheduler.flush();
                });
            }
            Err(_) => {
                self.inner.armed.store(false, Ordering::Release);
                tracing::trace!("no runtime to arm a flush; jobs wait for flush()");
            }
        }
    }

    /// Drain both queues, pre jobs before post jobs. Returns the number of jobs run.
    ///
    /// Jobs queued while flushing run in the same pass.
    pub fn flush(&self) -> usize {
        self.inner.armed.store(false, Ordering::Release);

        let mut ran = 0;
        loop {
            // Each lock is released before the job runs so jobs may enqueue more work.
            let next = self.inner.pre.lock().pop_front();
            let next = match next {
                Some(job) => Some(job),
                None => self.inner.post.lock().pop_front(),
            };

            match next {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => break,
            }
        }

        if ran > 0 {
            tracing::trace!(jobs = ran, "scheduler flushed");
        }
        ran
    }

    /// Number of queued jobs not yet flushed.
    pub fn pending(&self) -> usize {
        self.inner.pre.lock().len() + self.inner.post.lock().len()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
