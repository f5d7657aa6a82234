// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for scheduler lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Scheduler created and its workers started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use flowbridge::observability::messages::scheduler::SchedulerStarted;
///
/// let msg = SchedulerStarted {
///     name: "flow-concurrent",
///     strategy: "concurrent",
///     workers: 8,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct SchedulerStarted<'a> {
    pub name: &'a str,
    pub strategy: &'a str,
    pub workers: usize,
}

impl Display for SchedulerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scheduler '{}' started with {} strategy: workers={}",
            self.name, self.strategy, self.workers
        )
    }
}

impl StructuredLog for SchedulerStarted<'_> {
    fn log(&self) {
        tracing::info!(
            scheduler = self.name,
            strategy = self.strategy,
            workers = self.workers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scheduler",
            span_name = name,
            scheduler = self.name,
            strategy = self.strategy,
            workers = self.workers,
        )
    }
}

/// Scheduler stopped accepting work and began draining.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SchedulerShutdownStarted<'a> {
    pub name: &'a str,
    pub in_flight: usize,
    pub deadline: Duration,
}

impl Display for SchedulerShutdownStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scheduler '{}' shutting down: {} tasks in flight, deadline {:?}",
            self.name, self.in_flight, self.deadline
        )
    }
}

impl StructuredLog for SchedulerShutdownStarted<'_> {
    fn log(&self) {
        tracing::info!(
            scheduler = self.name,
            in_flight = self.in_flight,
            deadline_ms = self.deadline.as_millis() as u64,
            "{}", self
        );
    }
}

/// Scheduler drained every in-flight task before releasing its workers.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SchedulerDrained<'a> {
    pub name: &'a str,
    pub duration: Duration,
}

impl Display for SchedulerDrained<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Scheduler '{}' drained in {:?}", self.name, self.duration)
    }
}

impl StructuredLog for SchedulerDrained<'_> {
    fn log(&self) {
        tracing::info!(
            scheduler = self.name,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// Shutdown deadline elapsed with tasks still in flight; they were abandoned.
///
/// # Log Level
/// `warn!` - Work was dropped, but the process continues
pub struct SchedulerShutdownAbandoned<'a> {
    pub name: &'a str,
    pub pending: usize,
    pub deadline: Duration,
}

impl Display for SchedulerShutdownAbandoned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scheduler '{}' abandoned {} tasks after shutdown deadline of {:?}",
            self.name, self.pending, self.deadline
        )
    }
}

impl StructuredLog for SchedulerShutdownAbandoned<'_> {
    fn log(&self) {
        tracing::warn!(
            scheduler = self.name,
            pending = self.pending,
            deadline_ms = self.deadline.as_millis() as u64,
            "{}", self
        );
    }
}

/// A task panicked while running on a scheduler worker.
///
/// # Log Level
/// `error!` - Failure requiring attention; the worker keeps running
pub struct TaskPanicked<'a> {
    pub name: &'a str,
    pub message: &'a str,
}

impl Display for TaskPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task on scheduler '{}' panicked: {}", self.name, self.message)
    }
}

impl StructuredLog for TaskPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            scheduler = self.name,
            panic = self.message,
            "{}", self
        );
    }
}
