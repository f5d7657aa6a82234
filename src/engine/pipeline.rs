// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::config::consts::DEFAULT_DRAIN_BUDGET;
use crate::engine::operators::buffer::{BufferConfig, OverflowPolicy};
use crate::engine::publisher::{Item, Publisher};
use crate::engine::subscription::Subscription;
use crate::errors::FlowResult;
use crate::scheduler::Scheduler;
use crate::traits::Subscriber;

/// A publisher composed with operators and bound to the scheduler that
/// delivers its values.
///
/// Builder methods consume and return the pipeline, so stages apply in call
/// order. The pipeline itself is a description; each [`Pipeline::subscribe`]
/// instantiates an independent chain.
///
/// ```rust
/// use flowbridge::engine::{OverflowPolicy, Pipeline, Publisher};
/// use flowbridge::scheduler::Scheduler;
/// use flowbridge::traits::CallbackSubscriber;
/// use std::sync::{Arc, Mutex};
///
/// let scheduler = Scheduler::immediate()?;
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
///
/// let subscription = Pipeline::new(Publisher::sequence(1..=6), &scheduler)
///     .filter(|v| v % 2 == 0)
///     .map(|v| v * 10)
///     .buffer(4, OverflowPolicy::DropOldest)
///     .subscribe(CallbackSubscriber::values(move |v: i32| sink.lock().unwrap().push(v)))?;
/// subscription.request(10)?;
///
/// assert_eq!(*seen.lock().unwrap(), vec![20, 40, 60]);
/// # Ok::<(), flowbridge::errors::FlowError>(())
/// ```
#[derive(Clone, Debug)]
pub struct Pipeline<T: Item> {
    publisher: Publisher<T>,
    scheduler: Scheduler,
    drain_budget: usize,
}

impl<T: Item> Pipeline<T> {
    pub fn new(publisher: Publisher<T>, scheduler: &Scheduler) -> Self {
        Self {
            publisher,
            scheduler: scheduler.clone(),
            drain_budget: DEFAULT_DRAIN_BUDGET,
        }
    }

    /// Upstream pulls a single drain pass may make before yielding.
    pub fn with_drain_budget(mut self, drain_budget: usize) -> Self {
        self.drain_budget = drain_budget;
        self
    }

    pub fn map(self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.apply(|p| p.map(f))
    }

    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.apply(|p| p.filter(predicate))
    }

    pub fn buffer(self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.buffer_with(BufferConfig::new(capacity, overflow))
    }

    pub fn buffer_with(self, config: BufferConfig) -> Self {
        self.apply(|p| p.buffer(config))
    }

    /// Round-robin merge with `others`, this pipeline's source first.
    pub fn merge(self, others: impl IntoIterator<Item = Publisher<T>>) -> Self {
        self.apply(|p| p.merge(others))
    }

    pub fn debounce(self, interval: Duration) -> Self {
        self.apply(|p| p.debounce(interval))
    }

    fn apply(mut self, f: impl FnOnce(Publisher<T>) -> Publisher<T>) -> Self {
        self.publisher = f(self.publisher);
        self
    }

    pub fn subscribe(&self, subscriber: impl Subscriber<T> + 'static) -> FlowResult<Subscription<T>> {
        Subscription::subscribe_with_budget(
            &self.publisher,
            subscriber,
            &self.scheduler,
            self.drain_budget,
        )
    }

    pub fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn describe(&self) -> String {
        format!("{} @ {}", self.publisher.describe(), self.scheduler.name())
    }
}
