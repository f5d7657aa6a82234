// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-subscription stage chain.
//!
//! Opening a [`Publisher`](crate::engine::Publisher) yields a tree of `Stage`
//! values owned by exactly one subscription. The drain loop pulls from the
//! root one value per unit of downstream demand; every stage translates that
//! pull into pulls on its upstream. A filter that rejects a value pulls again,
//! so each upstream unit it consumes is re-requested.
//!
//! Buffer and debounce stages absorb upstream values eagerly, even while
//! downstream demand is zero. [`Stage::probe`] gives them that opportunity and
//! reports a terminal event that needs no demand to be delivered.

use std::iter::Peekable;
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::engine::external::ExternalTap;
use crate::engine::operators::buffer::BufferStage;
use crate::engine::operators::debounce::DebounceStage;
use crate::engine::operators::merge::MergeStage;
use crate::engine::publisher::{FilterFn, Item, MapFn};
use crate::errors::FlowError;
use crate::traits::Wake;

/// Terminal event of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Failed(FlowError),
}

/// Outcome of one pull.
#[derive(Debug)]
pub(crate) enum Step<T> {
    Ready(T),
    /// Nothing available now; a wake will follow when something is.
    Pending,
    Done(Terminal),
}

/// State threaded through one drain pass.
pub(crate) struct StageContext {
    waker: Weak<dyn Wake>,
    budget: usize,
    pulls: usize,
    exhausted: bool,
}

impl StageContext {
    pub(crate) fn new(waker: Weak<dyn Wake>, budget: usize) -> Self {
        Self {
            waker,
            budget,
            pulls: 0,
            exhausted: false,
        }
    }

    /// Accounts for one upstream pull. Returns `false` once the budget is spent.
    pub(crate) fn spend(&mut self) -> bool {
        if self.pulls >= self.budget {
            self.exhausted = true;
            return false;
        }
        self.pulls += 1;
        true
    }

    /// `true` if a stage went pending only because the budget ran out.
    pub(crate) fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn pulls(&self) -> usize {
        self.pulls
    }

    pub(crate) fn wake_at(&self, deadline: Instant) {
        if let Some(waker) = self.waker.upgrade() {
            waker.wake_at(deadline);
        }
    }
}

type BoxedIter<T> = Box<dyn Iterator<Item = T> + Send>;

pub(crate) enum Stage<T: Item> {
    Just(Option<T>),
    Sequence { items: Arc<[T]>, next: usize },
    Iter(Peekable<BoxedIter<T>>),
    Empty,
    Fail(FlowError),
    External(ExternalTap<T>),
    Map {
        upstream: Box<Stage<T>>,
        f: MapFn<T>,
    },
    Filter {
        upstream: Box<Stage<T>>,
        predicate: FilterFn<T>,
    },
    Buffer(BufferStage<T>),
    Merge(MergeStage<T>),
    Debounce(DebounceStage<T>),
}

impl<T: Item> Stage<T> {
    /// Produces at most one value for one unit of downstream demand.
    pub(crate) fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        match self {
            Stage::Just(slot) => {
                if slot.is_none() {
                    return Step::Done(Terminal::Completed);
                }
                if !cx.spend() {
                    return Step::Pending;
                }
                slot.take()
                    .map_or(Step::Done(Terminal::Completed), Step::Ready)
            }
            Stage::Sequence { items, next } => {
                if *next >= items.len() {
                    return Step::Done(Terminal::Completed);
                }
                if !cx.spend() {
                    return Step::Pending;
                }
                let value = items[*next].clone();
                *next += 1;
                Step::Ready(value)
            }
            Stage::Iter(iter) => {
                if !cx.spend() {
                    return Step::Pending;
                }
                iter.next()
                    .map_or(Step::Done(Terminal::Completed), Step::Ready)
            }
            Stage::Empty => Step::Done(Terminal::Completed),
            Stage::Fail(cause) => Step::Done(Terminal::Failed(cause.clone())),
            Stage::External(tap) => tap.pull(cx),
            Stage::Map { upstream, f } => match upstream.pull(cx) {
                Step::Ready(value) => Step::Ready(f(value)),
                Step::Pending => Step::Pending,
                Step::Done(terminal) => Step::Done(terminal),
            },
            Stage::Filter {
                upstream,
                predicate,
            } => loop {
                match upstream.pull(cx) {
                    Step::Ready(value) if predicate(&value) => return Step::Ready(value),
                    Step::Ready(_) => continue,
                    other => return other,
                }
            },
            Stage::Buffer(buffer) => buffer.pull(cx),
            Stage::Merge(merge) => merge.pull(cx),
            Stage::Debounce(debounce) => debounce.pull(cx),
        }
    }

    /// Runs without downstream demand. Eager stages absorb upstream values;
    /// the return value is a terminal event that can be delivered right away.
    pub(crate) fn probe(&mut self, cx: &mut StageContext) -> Option<Terminal> {
        match self {
            Stage::Just(slot) => slot.is_none().then_some(Terminal::Completed),
            Stage::Sequence { items, next } => {
                (*next >= items.len()).then_some(Terminal::Completed)
            }
            Stage::Iter(iter) => iter.peek().is_none().then_some(Terminal::Completed),
            Stage::Empty => Some(Terminal::Completed),
            Stage::Fail(cause) => Some(Terminal::Failed(cause.clone())),
            Stage::External(tap) => tap.probe(),
            Stage::Map { upstream, .. } | Stage::Filter { upstream, .. } => upstream.probe(cx),
            Stage::Buffer(buffer) => buffer.probe(cx),
            Stage::Merge(merge) => merge.probe(cx),
            Stage::Debounce(debounce) => debounce.probe(cx),
        }
    }

    /// Propagates cancellation to every upstream node.
    pub(crate) fn cancel(&mut self) {
        match self {
            Stage::Just(slot) => *slot = None,
            Stage::Sequence { items, next } => *next = items.len(),
            Stage::Iter(_) | Stage::Empty | Stage::Fail(_) => {}
            Stage::External(tap) => tap.detach(),
            Stage::Map { upstream, .. } | Stage::Filter { upstream, .. } => upstream.cancel(),
            Stage::Buffer(buffer) => buffer.cancel(),
            Stage::Merge(merge) => merge.cancel(),
            Stage::Debounce(debounce) => debounce.cancel(),
        }
    }
}

/// Waker that ignores every wake, for stages opened outside a subscription.
#[cfg(test)]
pub(crate) struct NoopWake;

#[cfg(test)]
impl Wake for NoopWake {
    fn wake(&self) {}

    fn wake_at(&self, _deadline: Instant) {}
}

#[cfg(test)]
pub(crate) fn test_context(budget: usize) -> StageContext {
    StageContext::new(Weak::<NoopWake>::new(), budget)
}
