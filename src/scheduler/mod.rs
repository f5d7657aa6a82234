// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Delivery schedulers.
//!
//! Three interchangeable strategies execute delivery work for subscriptions:
//!
//! - **Immediate**: runs each task synchronously on the submitting thread.
//!   Delayed work (debounce windows) runs on a single timer thread.
//! - **Serial**: one worker draining a FIFO queue, so every task runs in
//!   submission order.
//! - **Concurrent**: a pool of workers. Tasks sharing a [`TaskKey`] form a
//!   strand and run one at a time in submission order; different keys run in
//!   parallel.
//!
//! Worker pools and timers are `tokio` runtimes owned by the scheduler. A
//! scheduler is created explicitly and shut down explicitly; afterwards every
//! submission fails with [`FlowError::SchedulerShutdown`].
//!
//! # Examples
//!
//! ```rust
//! use flowbridge::scheduler::{Scheduler, TaskKey};
//! use std::sync::mpsc;
//!
//! let scheduler = Scheduler::serial()?;
//! let (tx, rx) = mpsc::channel();
//! for i in 0..3 {
//!     let tx = tx.clone();
//!     scheduler.submit(TaskKey(1), Box::new(move || tx.send(i).unwrap()))?;
//! }
//! let seen: Vec<i32> = rx.iter().take(3).collect();
//! assert_eq!(seen, vec![0, 1, 2]);
//! scheduler.shutdown();
//! # Ok::<(), flowbridge::errors::FlowError>(())
//! ```

mod in_flight;
mod strand;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;

use crate::config::consts::DEFAULT_SHUTDOWN_DEADLINE;
use crate::config::SchedulerConfig;
use crate::engine::Signal;
use crate::errors::{FlowError, FlowResult};
use crate::observability::messages::scheduler::{
    SchedulerDrained, SchedulerShutdownAbandoned, SchedulerShutdownStarted, SchedulerStarted,
    TaskPanicked,
};
use crate::observability::messages::StructuredLog;

use in_flight::{InFlight, InFlightGuard};
use strand::StrandMap;

/// Unit of delivery work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Serialization key. Tasks sharing a key never run concurrently and run in
/// submission order on every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey(pub u64);

/// Scheduling strategy, chosen when the scheduler is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Immediate,
    Serial,
    Concurrent { workers: usize },
}

impl SchedulerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Immediate => "immediate",
            SchedulerKind::Serial => "serial",
            SchedulerKind::Concurrent { .. } => "concurrent",
        }
    }

    fn workers(&self) -> usize {
        match self {
            SchedulerKind::Immediate | SchedulerKind::Serial => 1,
            SchedulerKind::Concurrent { workers } => (*workers).max(1),
        }
    }
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight task finished before the deadline.
    Drained,
    /// The deadline elapsed; `pending` tasks were abandoned.
    Abandoned { pending: usize },
    /// The scheduler had already been shut down.
    AlreadyShutdown,
}

/// Construction options shared by all strategies.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub name: Option<String>,
    pub shutdown_deadline: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            name: None,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }
}

struct Job {
    task: Task,
    _guard: InFlightGuard,
}

impl Job {
    fn run(self, scheduler: &str) {
        let Job { task, _guard } = self;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            TaskPanicked {
                name: scheduler,
                message: &message,
            }
            .log();
        }
    }
}

enum Dispatch {
    Inline,
    Queue(mpsc::UnboundedSender<Job>),
    Strands(Arc<StrandMap<Job>>),
}

struct SchedulerInner {
    name: Arc<str>,
    kind: SchedulerKind,
    shutdown_deadline: Duration,
    shutdown: AtomicBool,
    in_flight: Arc<InFlight>,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    dispatch: Dispatch,
}

/// Cloneable handle to a scheduler; clones share workers and queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn immediate() -> FlowResult<Self> {
        Self::new(SchedulerKind::Immediate)
    }

    pub fn serial() -> FlowResult<Self> {
        Self::new(SchedulerKind::Serial)
    }

    /// Worker pool with `workers` threads (at least one).
    pub fn concurrent(workers: usize) -> FlowResult<Self> {
        Self::new(SchedulerKind::Concurrent { workers })
    }

    pub fn new(kind: SchedulerKind) -> FlowResult<Self> {
        Self::with_options(kind, SchedulerOptions::default())
    }

    pub fn with_options(kind: SchedulerKind, options: SchedulerOptions) -> FlowResult<Self> {
        let name: Arc<str> = options
            .name
            .unwrap_or_else(|| format!("flow-{}", kind.as_str()))
            .into();
        let workers = kind.workers();

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(name.to_string())
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();

        let dispatch = match kind {
            SchedulerKind::Immediate => Dispatch::Inline,
            SchedulerKind::Serial => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
                let worker_name = Arc::clone(&name);
                runtime.spawn(async move {
                    while let Some(job) = rx.recv().await {
                        job.run(&worker_name);
                    }
                });
                Dispatch::Queue(tx)
            }
            SchedulerKind::Concurrent { .. } => Dispatch::Strands(Arc::new(StrandMap::new())),
        };

        SchedulerStarted {
            name: &name,
            strategy: kind.as_str(),
            workers,
        }
        .log();

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                name,
                kind,
                shutdown_deadline: options.shutdown_deadline,
                shutdown: AtomicBool::new(false),
                in_flight: Arc::new(InFlight::default()),
                runtime: Mutex::new(Some(runtime)),
                handle,
                dispatch,
            }),
        })
    }

    /// Scheduler described by a config section.
    pub fn from_config(config: &SchedulerConfig) -> FlowResult<Self> {
        Self::with_options(config.kind(), config.options())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> SchedulerKind {
        self.inner.kind
    }

    /// `true` when tasks run on the submitting thread.
    pub fn is_inline(&self) -> bool {
        matches!(self.inner.dispatch, Dispatch::Inline)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Tasks submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.current()
    }

    pub fn shutdown_deadline(&self) -> Duration {
        self.inner.shutdown_deadline
    }

    /// Submits `task` behind every earlier task with the same key.
    pub fn submit(&self, key: TaskKey, task: Task) -> FlowResult<()> {
        let guard = self.inner.in_flight.begin();
        if self.is_shutdown() {
            return Err(FlowError::SchedulerShutdown);
        }
        let job = Job {
            task,
            _guard: guard,
        };

        match &self.inner.dispatch {
            Dispatch::Inline => {
                job.run(&self.inner.name);
                Ok(())
            }
            Dispatch::Queue(tx) => tx.send(job).map_err(|_| FlowError::SchedulerShutdown),
            Dispatch::Strands(strands) => {
                if let Some(first) = strands.push(key, job) {
                    let strands = Arc::clone(strands);
                    let name = Arc::clone(&self.inner.name);
                    self.inner.handle.spawn(async move {
                        let mut job = first;
                        loop {
                            job.run(&name);
                            match strands.next(key) {
                                Some(next) => job = next,
                                None => break,
                            }
                            tokio::task::yield_now().await;
                        }
                    });
                }
                Ok(())
            }
        }
    }

    /// Submits `task` after `delay`, unless `signal` is set first.
    ///
    /// The timer itself is not counted as in flight; the task is, once submitted.
    pub fn submit_after(
        &self,
        delay: Duration,
        key: TaskKey,
        signal: Signal,
        task: Task,
    ) -> FlowResult<()> {
        if self.is_shutdown() {
            return Err(FlowError::SchedulerShutdown);
        }
        let scheduler: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        self.inner.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if signal.is_cancelled() {
                        return;
                    }
                    if let Some(inner) = scheduler.upgrade() {
                        let _ = Scheduler { inner }.submit(key, task);
                    }
                }
                _ = signal.cancelled() => {}
            }
        });
        Ok(())
    }

    /// Stops accepting work, waits up to the shutdown deadline for in-flight
    /// tasks, then releases the workers. Abandoned work is logged, not raised.
    ///
    /// Calling this from a task running on the same scheduler waits for the
    /// full deadline, since that task counts as in flight.
    pub fn shutdown(&self) -> ShutdownOutcome {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return ShutdownOutcome::AlreadyShutdown;
        }
        let deadline = self.inner.shutdown_deadline;
        SchedulerShutdownStarted {
            name: &self.inner.name,
            in_flight: self.in_flight(),
            deadline,
        }
        .log();

        let started = Instant::now();
        let pending = self.inner.in_flight.wait_idle(deadline);
        self.inner.release_runtime();

        if pending == 0 {
            SchedulerDrained {
                name: &self.inner.name,
                duration: started.elapsed(),
            }
            .log();
            ShutdownOutcome::Drained
        } else {
            SchedulerShutdownAbandoned {
                name: &self.inner.name,
                pending,
                deadline,
            }
            .log();
            ShutdownOutcome::Abandoned { pending }
        }
    }
}

impl SchedulerInner {
    fn release_runtime(&self) {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        // Safe from any context, including a worker of this runtime.
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.release_runtime();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("shutdown", &self.is_shutdown())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
