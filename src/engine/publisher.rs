// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Publisher descriptors.
//!
//! A `Publisher` describes how to produce values; it owns no subscribers and
//! can be subscribed any number of times, each subscription receiving an
//! independent sequence. The only exception is [`Publisher::from_iter_once`],
//! which wraps an iterator that can be consumed by a single subscription.
//!
//! Operators wrap upstream publishers and are themselves publishers, so a
//! pipeline is a tree of `Publisher` values that is instantiated into a stage
//! chain on every subscribe.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::engine::external::Emitter;
use crate::engine::operators::buffer::{BufferConfig, BufferStage};
use crate::engine::operators::debounce::DebounceStage;
use crate::engine::operators::merge::MergeStage;
use crate::engine::stage::Stage;
use crate::errors::{FlowError, FlowResult};
use crate::traits::Wake;

/// Values that can flow through the engine.
pub trait Item: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Item for T {}

pub type MapFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

type BoxedIter<T> = Box<dyn Iterator<Item = T> + Send>;

/// Single-use iterator source.
pub struct OnceSource<T> {
    iter: Mutex<Option<BoxedIter<T>>>,
}

impl<T> OnceSource<T> {
    fn take(&self) -> Option<BoxedIter<T>> {
        self.iter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn is_consumed(&self) -> bool {
        self.iter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// Source of values.
#[derive(Clone)]
pub enum Publisher<T: Item> {
    /// One value, then completion.
    Just(T),
    /// A finite sequence replayed from the start for every subscription.
    Sequence(Arc<[T]>),
    /// A lazily pulled iterator that only one subscription may consume.
    Once(Arc<OnceSource<T>>),
    /// Completes immediately.
    Empty,
    /// Fails immediately with the given cause.
    Fail(FlowError),
    /// Values pushed by the host through an [`Emitter`].
    External(Emitter<T>),
    /// A composable stage wrapping upstream publishers.
    Operator(Arc<Operator<T>>),
}

/// Closed set of operator stages.
pub enum Operator<T: Item> {
    Map {
        upstream: Publisher<T>,
        f: MapFn<T>,
    },
    Filter {
        upstream: Publisher<T>,
        predicate: FilterFn<T>,
    },
    Buffer {
        upstream: Publisher<T>,
        config: BufferConfig,
    },
    /// Round-robin fan-in of every source.
    Merge { sources: Vec<Publisher<T>> },
    Debounce {
        upstream: Publisher<T>,
        interval: Duration,
    },
}

impl<T: Item> Publisher<T> {
    pub fn just(value: T) -> Self {
        Publisher::Just(value)
    }

    pub fn sequence(values: impl IntoIterator<Item = T>) -> Self {
        Publisher::Sequence(values.into_iter().collect::<Vec<_>>().into())
    }

    /// Wraps an iterator that is pulled one element per upstream demand unit.
    /// A second subscribe fails with [`FlowError::AlreadyTerminated`].
    ///
    /// Completion is detected by peeking, so the iterator may be advanced one
    /// element ahead of demand. That element is held, not lost, and the
    /// look-ahead is not counted as a pull.
    pub fn from_iter_once<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Publisher::Once(Arc::new(OnceSource {
            iter: Mutex::new(Some(Box::new(iter.into_iter()))),
        }))
    }

    pub fn empty() -> Self {
        Publisher::Empty
    }

    pub fn fail(cause: FlowError) -> Self {
        Publisher::Fail(cause)
    }

    pub fn external(emitter: &Emitter<T>) -> Self {
        Publisher::External(emitter.clone())
    }

    pub fn map(self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.map_with(Arc::new(f))
    }

    pub fn map_with(self, f: MapFn<T>) -> Self {
        Self::operator(Operator::Map { upstream: self, f })
    }

    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter_with(Arc::new(predicate))
    }

    pub fn filter_with(self, predicate: FilterFn<T>) -> Self {
        Self::operator(Operator::Filter {
            upstream: self,
            predicate,
        })
    }

    pub fn buffer(self, config: BufferConfig) -> Self {
        Self::operator(Operator::Buffer {
            upstream: self,
            config,
        })
    }

    /// Merges `self` with `others`; `self` is first in the rotation.
    pub fn merge(self, others: impl IntoIterator<Item = Publisher<T>>) -> Self {
        let mut sources = vec![self];
        sources.extend(others);
        Self::operator(Operator::Merge { sources })
    }

    pub fn debounce(self, interval: Duration) -> Self {
        Self::operator(Operator::Debounce {
            upstream: self,
            interval,
        })
    }

    fn operator(operator: Operator<T>) -> Self {
        Publisher::Operator(Arc::new(operator))
    }

    /// Instantiates the per-subscription stage chain.
    pub(crate) fn open(&self, waker: &Weak<dyn Wake>) -> FlowResult<Stage<T>> {
        let stage = match self {
            Publisher::Just(value) => Stage::Just(Some(value.clone())),
            Publisher::Sequence(items) => Stage::Sequence {
                items: Arc::clone(items),
                next: 0,
            },
            Publisher::Once(source) => {
                let iter = source.take().ok_or(FlowError::AlreadyTerminated)?;
                Stage::Iter(iter.peekable())
            }
            Publisher::Empty => Stage::Empty,
            Publisher::Fail(cause) => Stage::Fail(cause.clone()),
            Publisher::External(emitter) => Stage::External(emitter.tap(waker.clone())),
            Publisher::Operator(operator) => match operator.as_ref() {
                Operator::Map { upstream, f } => Stage::Map {
                    upstream: Box::new(upstream.open(waker)?),
                    f: Arc::clone(f),
                },
                Operator::Filter {
                    upstream,
                    predicate,
                } => Stage::Filter {
                    upstream: Box::new(upstream.open(waker)?),
                    predicate: Arc::clone(predicate),
                },
                Operator::Buffer { upstream, config } => {
                    Stage::Buffer(BufferStage::new(upstream.open(waker)?, *config))
                }
                Operator::Merge { sources } => {
                    let stages = sources
                        .iter()
                        .map(|source| source.open(waker))
                        .collect::<FlowResult<Vec<_>>>()?;
                    Stage::Merge(MergeStage::new(stages))
                }
                Operator::Debounce { upstream, interval } => {
                    Stage::Debounce(DebounceStage::new(upstream.open(waker)?, *interval))
                }
            },
        };
        Ok(stage)
    }

    /// Short description of the chain, e.g. `sequence(3) -> filter -> map`.
    pub fn describe(&self) -> String {
        match self {
            Publisher::Just(_) => "just".to_string(),
            Publisher::Sequence(items) => format!("sequence({})", items.len()),
            Publisher::Once(_) => "once".to_string(),
            Publisher::Empty => "empty".to_string(),
            Publisher::Fail(_) => "fail".to_string(),
            Publisher::External(_) => "external".to_string(),
            Publisher::Operator(operator) => match operator.as_ref() {
                Operator::Map { upstream, .. } => format!("{} -> map", upstream.describe()),
                Operator::Filter { upstream, .. } => format!("{} -> filter", upstream.describe()),
                Operator::Buffer { upstream, config } => format!(
                    "{} -> buffer({}, {})",
                    upstream.describe(),
                    config.capacity,
                    config.overflow.as_str()
                ),
                Operator::Merge { sources } => format!(
                    "merge[{}]",
                    sources
                        .iter()
                        .map(Publisher::describe)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                Operator::Debounce { upstream, interval } => {
                    format!("{} -> debounce({:?})", upstream.describe(), interval)
                }
            },
        }
    }
}

impl<T: Item> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Publisher").field(&self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::operators::buffer::OverflowPolicy;

    #[test]
    fn describe_renders_the_chain() {
        let publisher = Publisher::sequence(vec![1, 2, 3])
            .filter(|v| v % 2 == 1)
            .map(|v| v * 10)
            .buffer(BufferConfig::new(4, OverflowPolicy::DropNewest));
        assert_eq!(
            publisher.describe(),
            "sequence(3) -> filter -> map -> buffer(4, drop_newest)"
        );
    }

    #[test]
    fn merge_keeps_receiver_first() {
        let merged = Publisher::just(1).merge(vec![Publisher::empty(), Publisher::just(2)]);
        assert_eq!(merged.describe(), "merge[just, empty, just]");
    }

    #[test]
    fn once_source_is_consumed_by_first_open() {
        let publisher = Publisher::from_iter_once(vec![1, 2]);
        let waker: Weak<dyn Wake> = Weak::<crate::engine::stage::NoopWake>::new();
        assert!(publisher.open(&waker).is_ok());
        assert!(matches!(
            publisher.open(&waker),
            Err(FlowError::AlreadyTerminated)
        ));
        if let Publisher::Once(source) = &publisher {
            assert!(source.is_consumed());
        }
    }
}
