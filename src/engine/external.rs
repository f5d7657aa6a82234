// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host-driven sources.
//!
//! An [`Emitter`] is the push side of [`Publisher::External`]. Every
//! subscription gets its own tap with a bounded queue; `emit` offers the value
//! to each tap and wakes its subscription. A tap's queue applies the emitter's
//! overflow policy, so a slow subscriber never grows memory without bound.
//!
//! Once the emitter completes or fails, later subscriptions receive that
//! terminal event immediately.
//!
//! [`Publisher::External`]: crate::engine::Publisher::External

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::config::consts::{DEFAULT_EXTERNAL_OVERFLOW, DEFAULT_EXTERNAL_QUEUE_CAPACITY};
use crate::engine::operators::buffer::{BoundedQueue, Offer, OverflowPolicy};
use crate::engine::publisher::Item;
use crate::engine::stage::{StageContext, Step, Terminal};
use crate::errors::FlowError;
use crate::traits::Wake;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct TapState<T> {
    queue: BoundedQueue<T>,
    terminal: Option<Terminal>,
}

struct TapShared<T> {
    state: Mutex<TapState<T>>,
    waker: Weak<dyn Wake>,
}

impl<T> TapShared<T> {
    /// Offers `value`; returns `false` if the tap was already terminated.
    fn offer(&self, value: T) -> bool {
        let mut state = lock(&self.state);
        if state.terminal.is_some() {
            return false;
        }
        if state.queue.offer(value) == Offer::Overflow {
            let cause = state.queue.overflow_error();
            state.queue.clear();
            state.terminal = Some(Terminal::Failed(cause));
        }
        true
    }

    fn terminate(&self, terminal: Terminal) {
        let mut state = lock(&self.state);
        if state.terminal.is_none() {
            state.terminal = Some(terminal);
        }
    }
}

struct EmitterState<T> {
    taps: Vec<(u64, Arc<TapShared<T>>)>,
    terminal: Option<Terminal>,
}

struct EmitterInner<T> {
    state: Mutex<EmitterState<T>>,
    queue_capacity: usize,
    overflow: OverflowPolicy,
    next_tap: AtomicU64,
}

/// Push handle for an external source. Clones share the same subscribers.
pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Item> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Emitter<T> {
    /// Emitter whose taps hold up to 1024 values and fail on overflow.
    pub fn new() -> Self {
        Self::with_queue(DEFAULT_EXTERNAL_QUEUE_CAPACITY, DEFAULT_EXTERNAL_OVERFLOW)
    }

    pub fn with_queue(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                state: Mutex::new(EmitterState {
                    taps: Vec::new(),
                    terminal: None,
                }),
                queue_capacity: capacity,
                overflow,
                next_tap: AtomicU64::new(1),
            }),
        }
    }

    /// Offers `value` to every attached subscription and returns how many
    /// accepted it. Returns 0 once the emitter has terminated.
    pub fn emit(&self, value: T) -> usize {
        let taps = self.attached();
        let mut wakers = Vec::with_capacity(taps.len());
        for tap in &taps {
            if tap.offer(value.clone()) {
                wakers.push(tap.waker.clone());
            }
        }
        // Wakes may run delivery inline; no lock is held here.
        let accepted = wakers.len();
        wake_all(wakers);
        accepted
    }

    /// Completes every attached subscription after its queued values.
    /// Returns `false` if the emitter had already terminated.
    pub fn complete(&self) -> bool {
        self.terminate(Terminal::Completed)
    }

    /// Fails every attached subscription with `cause`.
    pub fn fail(&self, cause: FlowError) -> bool {
        self.terminate(Terminal::Failed(cause))
    }

    /// Completes and detaches every attached subscription while the emitter
    /// stays open for new ones. Returns how many were detached.
    pub fn detach_all(&self) -> usize {
        let taps = std::mem::take(&mut lock(&self.inner.state).taps);
        let detached = taps.len();
        let wakers = taps
            .iter()
            .map(|(_, tap)| {
                tap.terminate(Terminal::Completed);
                tap.waker.clone()
            })
            .collect();
        wake_all(wakers);
        detached
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).taps.len()
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.inner.state).terminal.is_some()
    }

    fn attached(&self) -> Vec<Arc<TapShared<T>>> {
        let state = lock(&self.inner.state);
        if state.terminal.is_some() {
            return Vec::new();
        }
        state.taps.iter().map(|(_, tap)| Arc::clone(tap)).collect()
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        let taps = {
            let mut state = lock(&self.inner.state);
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal.clone());
            state
                .taps
                .iter()
                .map(|(_, tap)| Arc::clone(tap))
                .collect::<Vec<_>>()
        };
        let wakers = taps
            .iter()
            .map(|tap| {
                tap.terminate(terminal.clone());
                tap.waker.clone()
            })
            .collect();
        wake_all(wakers);
        true
    }

    /// Attaches a new subscription. A terminated emitter hands out a tap that
    /// already carries the terminal event.
    pub(crate) fn tap(&self, waker: Weak<dyn Wake>) -> ExternalTap<T> {
        let id = self.inner.next_tap.fetch_add(1, Ordering::Relaxed);
        let mut state = lock(&self.inner.state);
        let shared = Arc::new(TapShared {
            state: Mutex::new(TapState {
                queue: BoundedQueue::new(
                    "external queue",
                    self.inner.queue_capacity,
                    self.inner.overflow,
                ),
                terminal: state.terminal.clone(),
            }),
            waker,
        });
        if state.terminal.is_none() {
            state.taps.push((id, Arc::clone(&shared)));
        }
        ExternalTap {
            id,
            shared,
            emitter: Arc::downgrade(&self.inner),
        }
    }
}

fn wake_all(wakers: Vec<Weak<dyn Wake>>) {
    for waker in wakers {
        if let Some(waker) = waker.upgrade() {
            waker.wake();
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Emitter")
            .field("subscribers", &state.taps.len())
            .field("terminal", &state.terminal)
            .field("queue_capacity", &self.inner.queue_capacity)
            .field("overflow", &self.inner.overflow)
            .finish()
    }
}

/// One subscription's view of an [`Emitter`]. Detaches on drop.
pub(crate) struct ExternalTap<T> {
    id: u64,
    shared: Arc<TapShared<T>>,
    emitter: Weak<EmitterInner<T>>,
}

impl<T> ExternalTap<T> {
    pub(crate) fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        let mut state = lock(&self.shared.state);
        if !state.queue.is_empty() {
            if !cx.spend() {
                return Step::Pending;
            }
            if let Some(value) = state.queue.pop() {
                return Step::Ready(value);
            }
        }
        match &state.terminal {
            Some(terminal) => Step::Done(terminal.clone()),
            None => Step::Pending,
        }
    }

    pub(crate) fn probe(&self) -> Option<Terminal> {
        let state = lock(&self.shared.state);
        match &state.terminal {
            Some(failed @ Terminal::Failed(_)) => Some(failed.clone()),
            Some(Terminal::Completed) if state.queue.is_empty() => Some(Terminal::Completed),
            _ => None,
        }
    }

    /// Stops receiving values. Idempotent.
    pub(crate) fn detach(&mut self) {
        if let Some(emitter) = self.emitter.upgrade() {
            lock(&emitter.state).taps.retain(|(id, _)| *id != self.id);
        }
        self.emitter = Weak::new();
        let mut state = lock(&self.shared.state);
        state.queue.clear();
    }
}

impl<T> Drop for ExternalTap<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stage::{test_context, NoopWake};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingWake(AtomicUsize);

    impl Wake for CountingWake {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn wake_at(&self, _deadline: Instant) {}
    }

    fn noop() -> Weak<dyn Wake> {
        Weak::<NoopWake>::new()
    }

    #[test]
    fn emit_reaches_every_tap_and_wakes_it() {
        let emitter = Emitter::new();
        let wake = Arc::new(CountingWake(AtomicUsize::new(0)));
        let strong: Arc<dyn Wake> = wake.clone();
        let mut first = emitter.tap(Arc::downgrade(&strong));
        let mut second = emitter.tap(noop());

        assert_eq!(emitter.emit("a"), 2);
        assert_eq!(wake.0.load(Ordering::SeqCst), 1);

        let mut cx = test_context(usize::MAX);
        assert!(matches!(first.pull(&mut cx), Step::Ready("a")));
        assert!(matches!(second.pull(&mut cx), Step::Ready("a")));
        assert!(matches!(first.pull(&mut cx), Step::Pending));
    }

    #[test]
    fn completion_waits_for_queued_values() {
        let emitter = Emitter::new();
        let mut tap = emitter.tap(noop());
        emitter.emit(1);
        assert!(emitter.complete());
        assert!(!emitter.complete());
        assert_eq!(tap.probe(), None);

        let mut cx = test_context(usize::MAX);
        assert!(matches!(tap.pull(&mut cx), Step::Ready(1)));
        assert_eq!(tap.probe(), Some(Terminal::Completed));
        assert_eq!(emitter.emit(2), 0);
    }

    #[test]
    fn late_tap_sees_terminal_event() {
        let emitter: Emitter<i32> = Emitter::new();
        emitter.fail(FlowError::SourceFailure("closed".into()));
        let tap = emitter.tap(noop());
        assert!(matches!(tap.probe(), Some(Terminal::Failed(FlowError::SourceFailure(_)))));
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn overflow_fails_only_the_slow_tap() {
        let emitter = Emitter::with_queue(2, OverflowPolicy::FailSubscription);
        let mut slow = emitter.tap(noop());
        emitter.emit(1);
        emitter.emit(2);
        let mut fast = emitter.tap(noop());
        emitter.emit(3);

        assert!(matches!(
            slow.probe(),
            Some(Terminal::Failed(FlowError::OperatorFailure(_)))
        ));
        let mut cx = test_context(usize::MAX);
        assert!(matches!(slow.pull(&mut cx), Step::Done(Terminal::Failed(_))));
        assert!(matches!(fast.pull(&mut cx), Step::Ready(3)));
    }

    #[test]
    fn detach_all_completes_taps_and_stays_open() {
        let emitter = Emitter::new();
        let mut old = emitter.tap(noop());
        emitter.emit(1);
        assert_eq!(emitter.detach_all(), 1);
        assert!(!emitter.is_terminated());
        assert_eq!(emitter.subscriber_count(), 0);

        let mut cx = test_context(usize::MAX);
        assert!(matches!(old.pull(&mut cx), Step::Ready(1)));
        assert!(matches!(old.pull(&mut cx), Step::Done(Terminal::Completed)));

        let mut fresh = emitter.tap(noop());
        assert_eq!(emitter.emit(2), 1);
        assert!(matches!(fresh.pull(&mut cx), Step::Ready(2)));
    }

    #[test]
    fn dropping_a_tap_detaches_it() {
        let emitter: Emitter<i32> = Emitter::new();
        let tap = emitter.tap(noop());
        assert_eq!(emitter.subscriber_count(), 1);
        drop(tap);
        assert_eq!(emitter.subscriber_count(), 0);
        assert_eq!(emitter.emit(1), 0);
    }
}
