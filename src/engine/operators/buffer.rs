// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::engine::publisher::Item;
use crate::engine::stage::{Stage, StageContext, Step, Terminal};
use crate::errors::FlowError;
use crate::observability::messages::operator::ValueDropped;
use crate::observability::messages::StructuredLog;

/// What a full bounded queue does with one more value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued value and keep the new one.
    DropOldest,
    /// Discard the new value.
    DropNewest,
    /// Fail the subscription with an operator failure.
    FailSubscription,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::FailSubscription => "fail_subscription",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl BufferConfig {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self { capacity, overflow }
    }
}

/// Result of offering a value to a [`BoundedQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Accepted,
    Dropped,
    Overflow,
}

/// FIFO holding at most `capacity` values.
#[derive(Debug)]
pub(crate) struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    overflow: OverflowPolicy,
    stage: &'static str,
}

impl<T> BoundedQueue<T> {
    pub(crate) fn new(stage: &'static str, capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            overflow,
            stage,
        }
    }

    pub(crate) fn offer(&mut self, value: T) -> Offer {
        if self.items.len() < self.capacity {
            self.items.push_back(value);
            return Offer::Accepted;
        }
        match self.overflow {
            OverflowPolicy::DropOldest => {
                self.items.pop_front();
                self.items.push_back(value);
            }
            OverflowPolicy::DropNewest => {}
            OverflowPolicy::FailSubscription => return Offer::Overflow,
        }
        ValueDropped {
            stage: self.stage,
            capacity: self.capacity,
            policy: self.overflow.as_str(),
        }
        .log();
        Offer::Dropped
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn overflow_error(&self) -> FlowError {
        FlowError::OperatorFailure(format!(
            "{} overflow at capacity {}",
            self.stage, self.capacity
        ))
    }
}

/// Decouples upstream production from downstream demand.
pub(crate) struct BufferStage<T: Item> {
    upstream: Box<Stage<T>>,
    queue: BoundedQueue<T>,
    upstream_done: Option<Terminal>,
    failure: Option<FlowError>,
}

impl<T: Item> BufferStage<T> {
    pub(crate) fn new(upstream: Stage<T>, config: BufferConfig) -> Self {
        Self {
            upstream: Box::new(upstream),
            queue: BoundedQueue::new("buffer", config.capacity, config.overflow),
            upstream_done: None,
            failure: None,
        }
    }

    fn absorb(&mut self, cx: &mut StageContext) {
        while self.upstream_done.is_none() && self.failure.is_none() {
            match self.upstream.pull(cx) {
                Step::Ready(value) => {
                    if self.queue.offer(value) == Offer::Overflow {
                        self.failure = Some(self.queue.overflow_error());
                    }
                }
                Step::Pending => break,
                Step::Done(terminal) => self.upstream_done = Some(terminal),
            }
        }
    }

    /// Failures cut ahead of queued values; completion waits for the queue.
    fn terminal(&self) -> Option<Terminal> {
        if let Some(cause) = &self.failure {
            return Some(Terminal::Failed(cause.clone()));
        }
        match &self.upstream_done {
            Some(Terminal::Failed(cause)) => Some(Terminal::Failed(cause.clone())),
            Some(Terminal::Completed) if self.queue.is_empty() => Some(Terminal::Completed),
            _ => None,
        }
    }

    pub(crate) fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        self.absorb(cx);
        if let Some(Terminal::Failed(cause)) = self.terminal() {
            return Step::Done(Terminal::Failed(cause));
        }
        if let Some(value) = self.queue.pop() {
            return Step::Ready(value);
        }
        match self.terminal() {
            Some(terminal) => Step::Done(terminal),
            None => Step::Pending,
        }
    }

    pub(crate) fn probe(&mut self, cx: &mut StageContext) -> Option<Terminal> {
        self.absorb(cx);
        self.terminal()
    }

    pub(crate) fn cancel(&mut self) {
        self.queue.clear();
        self.upstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stage::test_context;

    #[test]
    fn drop_oldest_keeps_latest_values() {
        let mut queue = BoundedQueue::new("buffer", 2, OverflowPolicy::DropOldest);
        for v in 1..=3 {
            queue.offer(v);
        }
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn drop_newest_keeps_earliest_values() {
        let mut queue = BoundedQueue::new("buffer", 2, OverflowPolicy::DropNewest);
        let offers: Vec<Offer> = (1..=3).map(|v| queue.offer(v)).collect();
        assert_eq!(offers, vec![Offer::Accepted, Offer::Accepted, Offer::Dropped]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
    }

    #[test]
    fn fail_policy_reports_overflow_without_mutating() {
        let mut queue = BoundedQueue::new("buffer", 1, OverflowPolicy::FailSubscription);
        assert_eq!(queue.offer(1), Offer::Accepted);
        assert_eq!(queue.offer(2), Offer::Overflow);
        assert_eq!(queue.pop(), Some(1));
        assert!(matches!(queue.overflow_error(), FlowError::OperatorFailure(_)));
    }

    #[test]
    fn buffer_absorbs_without_demand_and_completes_after_draining() {
        let upstream = Stage::Sequence {
            items: vec![1, 2, 3].into(),
            next: 0,
        };
        let mut stage = BufferStage::new(upstream, BufferConfig::new(2, OverflowPolicy::DropOldest));
        let mut cx = test_context(usize::MAX);
        assert_eq!(stage.probe(&mut cx), None);
        assert!(matches!(stage.pull(&mut cx), Step::Ready(2)));
        assert_eq!(stage.probe(&mut cx), None);
        assert!(matches!(stage.pull(&mut cx), Step::Ready(3)));
        assert_eq!(stage.probe(&mut cx), Some(Terminal::Completed));
    }

    #[test]
    fn overflow_failure_cuts_ahead_of_queued_values() {
        let upstream = Stage::Sequence {
            items: vec![1, 2, 3].into(),
            next: 0,
        };
        let mut stage =
            BufferStage::new(upstream, BufferConfig::new(2, OverflowPolicy::FailSubscription));
        let mut cx = test_context(usize::MAX);
        assert!(matches!(
            stage.probe(&mut cx),
            Some(Terminal::Failed(FlowError::OperatorFailure(_)))
        ));
    }

    #[test]
    fn policy_names_match_serde() {
        let parsed: OverflowPolicy = serde_yaml::from_str("fail_subscription").unwrap();
        assert_eq!(parsed, OverflowPolicy::FailSubscription);
        assert_eq!(parsed.as_str(), "fail_subscription");
    }
}
