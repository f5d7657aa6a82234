// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-key FIFO strands for the concurrent scheduler.
//!
//! A strand is the execution token for one key: while a runner owns it, new
//! jobs for that key queue behind the running one instead of starting on
//! another worker. Distinct keys run in parallel.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::TaskKey;

pub(crate) struct StrandMap<J> {
    queues: Mutex<HashMap<TaskKey, VecDeque<J>>>,
}

impl<J> StrandMap<J> {
    pub(crate) fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queues `job` behind the strand's running job. When the strand is idle the
    /// job is handed back and the caller becomes the strand's runner.
    pub(crate) fn push(&self, key: TaskKey, job: J) -> Option<J> {
        match self.lock().entry(key) {
            Entry::Occupied(mut queue) => {
                queue.get_mut().push_back(job);
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                Some(job)
            }
        }
    }

    /// Next job for the runner of `key`; releases the strand when empty.
    pub(crate) fn next(&self, key: TaskKey) -> Option<J> {
        let mut queues = self.lock();
        let next = queues.get_mut(&key).and_then(VecDeque::pop_front);
        if next.is_none() {
            queues.remove(&key);
        }
        next
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskKey, VecDeque<J>>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_claims_the_strand() {
        let strands = StrandMap::new();
        assert_eq!(strands.push(TaskKey(1), "a"), Some("a"));
        assert_eq!(strands.push(TaskKey(1), "b"), None);
        assert_eq!(strands.push(TaskKey(2), "x"), Some("x"));
        assert_eq!(strands.active(), 2);
    }

    #[test]
    fn next_drains_in_fifo_order_then_releases() {
        let strands = StrandMap::new();
        strands.push(TaskKey(1), 1);
        strands.push(TaskKey(1), 2);
        strands.push(TaskKey(1), 3);
        assert_eq!(strands.next(TaskKey(1)), Some(2));
        assert_eq!(strands.next(TaskKey(1)), Some(3));
        assert_eq!(strands.next(TaskKey(1)), None);
        assert_eq!(strands.active(), 0);
        assert_eq!(strands.push(TaskKey(1), 4), Some(4));
    }
}
