// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Subscription state machine and delivery loop.
//!
//! A subscription binds one stage chain to one subscriber and one scheduler.
//! Delivery happens in *drain passes*: a pass pulls from the chain while
//! downstream demand is outstanding, hands each value to the subscriber, and
//! delivers the terminal event once the chain reports one.
//!
//! Passes are serialized by a work-in-progress counter. Any caller that bumps
//! the counter from zero owns the drain and submits it to the scheduler; every
//! other caller only records that more work arrived. This keeps `request` and
//! `cancel` safe to call from inside subscriber callbacks on every scheduler,
//! including the immediate one.
//!
//! ```text
//!   Unsubscribed ──subscribe──▶ Active ──complete──▶ Completed
//!        │                        │ ────fail──────▶ Failed
//!        └──────cancel────────────┴─────cancel────▶ Cancelled
//! ```
//!
//! Terminal states are absorbing. Exactly one of completion, failure or
//! cancellation wins; the loser is a silent no-op.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use crate::config::consts::DEFAULT_DRAIN_BUDGET;
use crate::engine::demand::{DemandAdded, DemandCounter};
use crate::engine::publisher::{Item, Publisher};
use crate::engine::signal::Signal;
use crate::engine::stage::{Stage, StageContext, Step, Terminal};
use crate::errors::{FlowError, FlowResult};
use crate::observability::messages::subscription::{
    DemandSaturated, DrainRejected, DrainYielded, SubscriberPanicked, SubscriptionActivated,
    SubscriptionFailed, SubscriptionTerminated,
};
use crate::observability::messages::StructuredLog;
use crate::scheduler::{Scheduler, TaskKey};
use crate::traits::{Subscriber, Wake};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

const UNSUBSCRIBED: u8 = 0;
const ACTIVE: u8 = 1;
const COMPLETED: u8 = 2;
const FAILED: u8 = 3;
const CANCELLED: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Unsubscribed,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SubscriptionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            UNSUBSCRIBED => SubscriptionState::Unsubscribed,
            ACTIVE => SubscriptionState::Active,
            COMPLETED => SubscriptionState::Completed,
            FAILED => SubscriptionState::Failed,
            _ => SubscriptionState::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Completed | SubscriptionState::Failed | SubscriptionState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Unsubscribed => "unsubscribed",
            SubscriptionState::Active => "active",
            SubscriptionState::Completed => "completed",
            SubscriptionState::Failed => "failed",
            SubscriptionState::Cancelled => "cancelled",
        }
    }
}

/// Point-in-time view of a subscription's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub id: u64,
    pub state: SubscriptionState,
    pub outstanding: u64,
    pub requested: u64,
    pub delivered: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum PassOutcome {
    /// Nothing more to do until the next wake.
    Idle,
    /// The pull budget ran out with work left.
    Yielded { pulls: usize },
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) struct SubscriptionCore<T: Item> {
    id: u64,
    key: TaskKey,
    signal: Signal,
    demand: DemandCounter,
    state: AtomicU8,
    wip: AtomicUsize,
    chain: Mutex<Option<Stage<T>>>,
    subscriber: Mutex<Box<dyn Subscriber<T>>>,
    scheduler: Scheduler,
    drain_budget: usize,
    weak_self: Weak<SubscriptionCore<T>>,
}

impl<T: Item> SubscriptionCore<T> {
    fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `to` unless already terminal. Returns whether this call won.
    fn transition(&self, to: u8) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if SubscriptionState::from_u8(current).is_terminal() {
                return false;
            }
            match self
                .state
                .compare_exchange(current, to, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn schedule_drain(self: &Arc<Self>) -> FlowResult<()> {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return Ok(());
        }
        self.submit_drain(1)
    }

    fn submit_drain(self: &Arc<Self>, missed: usize) -> FlowResult<()> {
        let core = Arc::clone(self);
        let result = self
            .scheduler
            .submit(self.key, Box::new(move || core.drain(missed)));
        if let Err(error) = &result {
            self.wip.store(0, Ordering::Release);
            DrainRejected {
                subscription_id: self.id,
                error,
            }
            .log();
        }
        result
    }

    fn drain(self: &Arc<Self>, mut missed: usize) {
        loop {
            if let PassOutcome::Yielded { pulls } = self.drain_pass() {
                if self.scheduler.is_inline() {
                    // Without demand, eager absorption resumes on the next request.
                    if self.demand.outstanding() > 0 {
                        continue;
                    }
                } else {
                    return self.yield_drain(missed, pulls);
                }
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = previous - missed;
            if missed == 0 {
                return;
            }
        }
    }

    fn yield_drain(self: &Arc<Self>, missed: usize, pulls: usize) {
        DrainYielded {
            subscription_id: self.id,
            pulls,
        }
        .log();
        // The token travels with the continuation.
        let _ = self.submit_drain(missed);
    }

    fn drain_pass(&self) -> PassOutcome {
        let mut chain = lock(&self.chain);
        let mut cx = StageContext::new(self.weak_self.clone(), self.drain_budget);
        loop {
            if self.signal.is_cancelled() || self.state().is_terminal() {
                if let Some(mut stage) = chain.take() {
                    stage.cancel();
                }
                return PassOutcome::Idle;
            }
            let Some(stage) = chain.as_mut() else {
                return PassOutcome::Idle;
            };
            let step = if self.demand.outstanding() > 0 {
                stage.pull(&mut cx)
            } else {
                match stage.probe(&mut cx) {
                    Some(terminal) => Step::Done(terminal),
                    None => Step::Pending,
                }
            };
            match step {
                Step::Ready(value) => {
                    let reserved = self.demand.try_take_one();
                    debug_assert!(reserved, "only the drain consumes demand");
                    self.deliver(value);
                }
                Step::Pending if cx.exhausted() => {
                    return PassOutcome::Yielded { pulls: cx.pulls() };
                }
                Step::Pending => return PassOutcome::Idle,
                Step::Done(terminal) => self.finish(terminal),
            }
        }
    }

    fn deliver(&self, value: T) {
        if self.signal.is_cancelled() {
            return;
        }
        self.invoke(|subscriber| subscriber.on_next(value));
    }

    fn finish(&self, terminal: Terminal) {
        let (to, outcome) = match &terminal {
            Terminal::Completed => (COMPLETED, "completed"),
            Terminal::Failed(_) => (FAILED, "failed"),
        };
        if !self.transition(to) {
            return;
        }
        self.signal.cancel();
        SubscriptionTerminated {
            subscription_id: self.id,
            outcome,
            delivered: self.demand.delivered(),
        }
        .log();
        match terminal {
            Terminal::Completed => self.invoke(|subscriber| subscriber.on_complete()),
            Terminal::Failed(error) => {
                SubscriptionFailed {
                    subscription_id: self.id,
                    error: &error,
                }
                .log();
                self.invoke(move |subscriber| subscriber.on_error(error));
            }
        }
    }

    /// Runs one subscriber callback. A panicking subscriber is cancelled.
    fn invoke(&self, callback: impl FnOnce(&mut dyn Subscriber<T>)) {
        let mut subscriber = lock(&self.subscriber);
        let outcome = catch_unwind(AssertUnwindSafe(|| callback(subscriber.as_mut())));
        drop(subscriber);
        if let Err(payload) = outcome {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            SubscriberPanicked {
                subscription_id: self.id,
                message: &message,
            }
            .log();
            if self.transition(CANCELLED) {
                self.signal.cancel();
            }
        }
    }

    fn cancel(self: &Arc<Self>) {
        if !self.transition(CANCELLED) {
            return;
        }
        self.signal.cancel();
        SubscriptionTerminated {
            subscription_id: self.id,
            outcome: "cancelled",
            delivered: self.demand.delivered(),
        }
        .log();
        // Teardown runs inside a drain pass so it never races one.
        if self.schedule_drain().is_err() {
            if let Some(mut stage) = lock(&self.chain).take() {
                stage.cancel();
            }
        }
    }

    fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            id: self.id,
            state: self.state(),
            outstanding: self.demand.outstanding(),
            requested: self.demand.requested(),
            delivered: self.demand.delivered(),
        }
    }
}

impl<T: Item> Wake for SubscriptionCore<T> {
    fn wake(&self) {
        if let Some(core) = self.weak_self.upgrade() {
            let _ = core.schedule_drain();
        }
    }

    fn wake_at(&self, deadline: Instant) {
        let weak = self.weak_self.clone();
        let delay = deadline.saturating_duration_since(Instant::now());
        let _ = self.scheduler.submit_after(
            delay,
            self.key,
            self.signal.clone(),
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    let _ = core.schedule_drain();
                }
            }),
        );
    }
}

/// Handle to one active binding of a publisher to a subscriber.
///
/// Clones refer to the same subscription. Dropping every handle detaches the
/// subscription without a terminal callback once no delivery work is queued.
pub struct Subscription<T: Item> {
    core: Arc<SubscriptionCore<T>>,
}

impl<T: Item> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Item> Subscription<T> {
    /// Binds `subscriber` to a fresh stage chain built from `publisher`.
    ///
    /// No values flow until [`Subscription::request`] is called, but a source
    /// that is already empty or failed delivers its terminal event at once.
    pub fn subscribe(
        publisher: &Publisher<T>,
        subscriber: impl Subscriber<T> + 'static,
        scheduler: &Scheduler,
    ) -> FlowResult<Self> {
        Self::subscribe_with_budget(publisher, subscriber, scheduler, DEFAULT_DRAIN_BUDGET)
    }

    /// Like [`Subscription::subscribe`], with a custom per-pass pull budget.
    pub fn subscribe_with_budget(
        publisher: &Publisher<T>,
        subscriber: impl Subscriber<T> + 'static,
        scheduler: &Scheduler,
        drain_budget: usize,
    ) -> FlowResult<Self> {
        if scheduler.is_shutdown() {
            return Err(FlowError::SchedulerShutdown);
        }
        if drain_budget == 0 {
            return Err(FlowError::InvalidArgument(
                "drain budget must be at least 1".into(),
            ));
        }
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let core = Arc::new_cyclic(|weak_self| SubscriptionCore {
            id,
            key: TaskKey(id),
            signal: Signal::new(),
            demand: DemandCounter::new(),
            state: AtomicU8::new(UNSUBSCRIBED),
            wip: AtomicUsize::new(0),
            chain: Mutex::new(None),
            subscriber: Mutex::new(Box::new(subscriber) as Box<dyn Subscriber<T>>),
            scheduler: scheduler.clone(),
            drain_budget,
            weak_self: weak_self.clone(),
        });

        let strong: Arc<dyn Wake> = core.clone();
        let waker = Arc::downgrade(&strong);
        drop(strong);
        let stage = publisher.open(&waker)?;
        *lock(&core.chain) = Some(stage);
        core.transition(ACTIVE);
        SubscriptionActivated {
            subscription_id: id,
            scheduler: scheduler.kind().as_str(),
        }
        .log();

        core.schedule_drain()?;
        Ok(Self { core })
    }

    /// Adds `n` to outstanding demand. Zero and requests on a terminated
    /// subscription are no-ops; demand beyond the maximum saturates.
    pub fn request(&self, n: u64) -> FlowResult<()> {
        if n == 0 || self.core.state().is_terminal() {
            return Ok(());
        }
        if self.core.demand.add(n) == DemandAdded::Saturated {
            DemandSaturated {
                subscription_id: self.core.id,
                requested: n,
            }
            .log();
        }
        self.core.schedule_drain()
    }

    /// Stops delivery. Idempotent; no terminal callback follows.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.core.state().is_terminal()
    }

    /// Shared cancellation flag of this subscription.
    pub fn signal(&self) -> &Signal {
        &self.core.signal
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.core.stats()
    }
}

impl<T: Item> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("stats", &self.stats())
            .field("scheduler", &self.core.scheduler.name())
            .finish()
    }
}
