// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Registry of named multicast signals.
//!
//! Each signal is an [`Emitter`] looked up by name. Connecting to a signal
//! subscribes with unbounded demand, so connected subscribers see every value
//! emitted after they connect, bounded only by the per-subscription queue.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::consts::{DEFAULT_EXTERNAL_OVERFLOW, DEFAULT_EXTERNAL_QUEUE_CAPACITY};
use crate::engine::{Emitter, Item, OverflowPolicy, Publisher, Subscription};
use crate::errors::FlowResult;
use crate::scheduler::Scheduler;
use crate::traits::Subscriber;

pub struct SignalHub<T: Item> {
    signals: Mutex<BTreeMap<String, Emitter<T>>>,
    queue_capacity: usize,
    overflow: OverflowPolicy,
}

impl<T: Item> Default for SignalHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> SignalHub<T> {
    pub fn new() -> Self {
        Self::with_queue(DEFAULT_EXTERNAL_QUEUE_CAPACITY, DEFAULT_EXTERNAL_OVERFLOW)
    }

    /// Hub whose signals give each connection a queue of `capacity` values.
    pub fn with_queue(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            signals: Mutex::new(BTreeMap::new()),
            queue_capacity: capacity,
            overflow,
        }
    }

    fn signals(&self) -> MutexGuard<'_, BTreeMap<String, Emitter<T>>> {
        self.signals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_or_create(&self, name: &str) -> Emitter<T> {
        self.signals()
            .entry(name.to_string())
            .or_insert_with(|| Emitter::with_queue(self.queue_capacity, self.overflow))
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals().contains_key(name)
    }

    /// Removes the signal and completes its connections.
    /// Returns `false` if no such signal was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.signals().remove(name);
        match removed {
            Some(emitter) => {
                emitter.complete();
                true
            }
            None => false,
        }
    }

    /// Completes every current connection but keeps the signal registered.
    /// Returns how many connections were dropped.
    pub fn disconnect_all(&self, name: &str) -> usize {
        let emitter = self.signals().get(name).cloned();
        emitter.map_or(0, |emitter| emitter.detach_all())
    }

    /// Emits on `name`, registering the signal on first use. Returns the
    /// number of connections that accepted the value.
    pub fn emit(&self, name: &str, value: T) -> usize {
        // The lock is released before emitting; delivery may run inline.
        let emitter = self.get_or_create(name);
        emitter.emit(value)
    }

    /// Publisher for `name`, registering the signal on first use.
    pub fn publisher(&self, name: &str) -> Publisher<T> {
        Publisher::external(&self.get_or_create(name))
    }

    /// Subscribes `subscriber` to `name` with unbounded demand.
    pub fn connect(
        &self,
        name: &str,
        subscriber: impl Subscriber<T> + 'static,
        scheduler: &Scheduler,
    ) -> FlowResult<Subscription<T>> {
        let subscription = Subscription::subscribe(&self.publisher(name), subscriber, scheduler)?;
        subscription.request(u64::MAX)?;
        Ok(subscription)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.signals().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.signals().len()
    }
}
