// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Count of submitted-but-unfinished tasks, with a bounded wait for idleness.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn begin(self: &Arc<Self>) -> InFlightGuard {
        *self.lock() += 1;
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn current(&self) -> usize {
        *self.lock()
    }

    /// Blocks until no task is in flight or `timeout` elapses.
    /// Returns the number of tasks still in flight.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            count = match self.idle.wait_timeout(count, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *count
    }

    fn end(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks one task as finished when dropped, whether it ran, panicked or was discarded.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.end();
    }
}
