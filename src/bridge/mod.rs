// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Handle-based facade over the engine for foreign callers.
//!
//! A [`Bridge`] owns every object created through it in handle tables and
//! exchanges only opaque `u64` handles, byte payloads and JSON parameter
//! strings. Nothing in the engine depends on it; [`abi`] exposes one
//! process-wide instance through `extern "C"` functions.
//!
//! Calls that may run delivery inline (subscribe, request, cancel, emit)
//! copy what they need out of the tables and release every lock first, so a
//! callback can call back into the bridge.

pub mod abi;
pub mod compose;
pub mod handles;
pub mod hub;
pub mod spec;
pub mod transforms;

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::config::consts::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_DRAIN_BUDGET, DEFAULT_EXTERNAL_OVERFLOW,
    DEFAULT_EXTERNAL_QUEUE_CAPACITY, DEFAULT_OVERFLOW_POLICY, DEFAULT_SHUTDOWN_DEADLINE,
};
use crate::engine::{
    BufferConfig, Emitter, OverflowPolicy, Publisher, Subscription, SubscriptionState,
    SubscriptionStats,
};
use crate::errors::{FlowError, FlowResult};
use crate::scheduler::{Scheduler, SchedulerKind, SchedulerOptions, ShutdownOutcome};
use crate::traits::Subscriber;

pub use handles::{handle_tag, Handle, HandleTable};
pub use hub::SignalHub;
pub use spec::{MergeSource, OperatorSpec, PredicateSpec, SourceSpec, TransformSpec, ValueEncoding};
pub use transforms::NamedOperatorFactory;

/// Values exchanged across the boundary.
pub type Payload = Vec<u8>;

const SCHEDULER_TAG: u8 = 1;
const PUBLISHER_TAG: u8 = 2;
const PIPELINE_TAG: u8 = 3;
const SUBSCRIPTION_TAG: u8 = 4;

/// Defaults applied to objects created through a bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub buffer: BufferConfig,
    pub external_queue_capacity: usize,
    pub external_overflow: OverflowPolicy,
    pub drain_budget: usize,
    pub shutdown_deadline: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_OVERFLOW_POLICY),
            external_queue_capacity: DEFAULT_EXTERNAL_QUEUE_CAPACITY,
            external_overflow: DEFAULT_EXTERNAL_OVERFLOW,
            drain_budget: DEFAULT_DRAIN_BUDGET,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }
}

struct PublisherEntry {
    publisher: Publisher<Payload>,
    /// Push side, for external and signal sources.
    emitter: Option<Emitter<Payload>>,
    /// Completed on dispose; hub signals outlive their publishers.
    owns_emitter: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Bridge {
    settings: BridgeSettings,
    schedulers: Mutex<HandleTable<Scheduler>>,
    publishers: Mutex<HandleTable<PublisherEntry>>,
    pipelines: Mutex<HandleTable<Publisher<Payload>>>,
    subscriptions: Mutex<HandleTable<Subscription<Payload>>>,
    hub: SignalHub<Payload>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self::with_settings(BridgeSettings::default())
    }

    pub fn with_settings(settings: BridgeSettings) -> Self {
        let hub = SignalHub::with_queue(settings.external_queue_capacity, settings.external_overflow);
        Self {
            settings,
            schedulers: Mutex::new(HandleTable::new("scheduler", SCHEDULER_TAG)),
            publishers: Mutex::new(HandleTable::new("publisher", PUBLISHER_TAG)),
            pipelines: Mutex::new(HandleTable::new("pipeline", PIPELINE_TAG)),
            subscriptions: Mutex::new(HandleTable::new("subscription", SUBSCRIPTION_TAG)),
            hub,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn hub(&self) -> &SignalHub<Payload> {
        &self.hub
    }

    // --- schedulers -------------------------------------------------------

    pub fn create_scheduler(&self, kind: SchedulerKind) -> FlowResult<Handle> {
        if let SchedulerKind::Concurrent { workers: 0 } = kind {
            return Err(FlowError::InvalidArgument(
                "concurrent scheduler needs at least one worker".into(),
            ));
        }
        let scheduler = Scheduler::with_options(
            kind,
            SchedulerOptions {
                name: None,
                shutdown_deadline: self.settings.shutdown_deadline,
            },
        )?;
        lock(&self.schedulers).insert(scheduler)
    }

    /// Shuts the scheduler down; its handle stays valid until disposed.
    pub fn shutdown_scheduler(&self, handle: Handle) -> FlowResult<ShutdownOutcome> {
        let scheduler = lock(&self.schedulers).get(handle)?.clone();
        Ok(scheduler.shutdown())
    }

    fn scheduler(&self, handle: Handle) -> FlowResult<Scheduler> {
        Ok(lock(&self.schedulers).get(handle)?.clone())
    }

    // --- publishers and pipelines -----------------------------------------

    /// Creates a source publisher from a kind name and JSON parameters.
    pub fn create_publisher(&self, kind: &str, params_json: &str) -> FlowResult<Handle> {
        let spec = SourceSpec::from_kind_and_params(kind, params_json)?;
        self.create_publisher_from_spec(&spec)
    }

    pub fn create_publisher_from_spec(&self, spec: &SourceSpec) -> FlowResult<Handle> {
        let entry = self.build_source(spec)?;
        lock(&self.publishers).insert(entry)
    }

    fn build_source(&self, spec: &SourceSpec) -> FlowResult<PublisherEntry> {
        let entry = match spec {
            SourceSpec::External {
                queue_capacity,
                overflow,
            } => {
                let capacity = queue_capacity.unwrap_or(self.settings.external_queue_capacity);
                if capacity == 0 {
                    return Err(FlowError::InvalidArgument(
                        "external queue_capacity must be positive".into(),
                    ));
                }
                let emitter = Emitter::with_queue(
                    capacity,
                    overflow.unwrap_or(self.settings.external_overflow),
                );
                PublisherEntry {
                    publisher: Publisher::external(&emitter),
                    emitter: Some(emitter),
                    owns_emitter: true,
                }
            }
            SourceSpec::Signal { name } => {
                let emitter = self.hub.get_or_create(name);
                PublisherEntry {
                    publisher: Publisher::external(&emitter),
                    emitter: Some(emitter),
                    owns_emitter: false,
                }
            }
            _ => PublisherEntry {
                publisher: compose::source_publisher(spec)?,
                emitter: None,
                owns_emitter: false,
            },
        };
        Ok(entry)
    }

    /// Looks up a publisher or pipeline handle.
    fn resolve(&self, handle: Handle) -> FlowResult<Publisher<Payload>> {
        match handle_tag(handle) {
            PUBLISHER_TAG => Ok(lock(&self.publishers).get(handle)?.publisher.clone()),
            PIPELINE_TAG => Ok(lock(&self.pipelines).get(handle)?.clone()),
            _ => Err(FlowError::InvalidHandle(handle)),
        }
    }

    /// Composes `operators` in order onto a publisher or pipeline.
    pub fn create_pipeline(&self, source: Handle, operators: &[OperatorSpec]) -> FlowResult<Handle> {
        let mut publisher = self.resolve(source)?;
        for spec in operators {
            publisher = self.apply_operator(publisher, spec)?;
        }
        lock(&self.pipelines).insert(publisher)
    }

    pub fn create_pipeline_json(&self, source: Handle, operators_json: &str) -> FlowResult<Handle> {
        let operators = OperatorSpec::parse_list(operators_json)?;
        self.create_pipeline(source, &operators)
    }

    /// Applies one operator spec. Merge sources may be handles or inline
    /// specs, including signals.
    fn apply_operator(
        &self,
        publisher: Publisher<Payload>,
        spec: &OperatorSpec,
    ) -> FlowResult<Publisher<Payload>> {
        compose::apply_operator(publisher, spec, &self.settings, |source| match source {
            MergeSource::Handle(handle) => self.resolve(*handle),
            MergeSource::Inline(spec) => Ok(self.build_source(spec)?.publisher),
        })
    }

    /// Pushes a value into an external or signal publisher.
    pub fn emit(&self, publisher: Handle, payload: Payload) -> FlowResult<usize> {
        Ok(self.emitter(publisher)?.emit(payload))
    }

    pub fn complete(&self, publisher: Handle) -> FlowResult<()> {
        self.emitter(publisher)?.complete();
        Ok(())
    }

    pub fn fail(&self, publisher: Handle, message: &str) -> FlowResult<()> {
        self.emitter(publisher)?
            .fail(FlowError::SourceFailure(message.to_string()));
        Ok(())
    }

    fn emitter(&self, handle: Handle) -> FlowResult<Emitter<Payload>> {
        lock(&self.publishers)
            .get(handle)?
            .emitter
            .clone()
            .ok_or_else(|| {
                FlowError::InvalidArgument(format!(
                    "publisher {:#x} is not externally driven",
                    handle
                ))
            })
    }

    // --- subscriptions ----------------------------------------------------

    /// Subscribes to a pipeline (or bare publisher) on the given scheduler.
    pub fn subscribe(
        &self,
        pipeline: Handle,
        subscriber: impl Subscriber<Payload> + 'static,
        scheduler: Handle,
    ) -> FlowResult<Handle> {
        let publisher = self.resolve(pipeline)?;
        let scheduler = self.scheduler(scheduler)?;
        let subscription = Subscription::subscribe_with_budget(
            &publisher,
            subscriber,
            &scheduler,
            self.settings.drain_budget,
        )?;
        lock(&self.subscriptions).insert(subscription)
    }

    fn subscription(&self, handle: Handle) -> FlowResult<Subscription<Payload>> {
        Ok(lock(&self.subscriptions).get(handle)?.clone())
    }

    pub fn request(&self, subscription: Handle, n: u64) -> FlowResult<()> {
        self.subscription(subscription)?.request(n)
    }

    pub fn cancel(&self, subscription: Handle) -> FlowResult<()> {
        self.subscription(subscription)?.cancel();
        Ok(())
    }

    pub fn subscription_state(&self, subscription: Handle) -> FlowResult<SubscriptionState> {
        Ok(self.subscription(subscription)?.state())
    }

    pub fn subscription_stats(&self, subscription: Handle) -> FlowResult<SubscriptionStats> {
        Ok(self.subscription(subscription)?.stats())
    }

    /// Releases the object behind any handle exactly once.
    ///
    /// Subscriptions are cancelled (a no-op once terminal), schedulers shut
    /// down, and external publishers completed.
    pub fn dispose(&self, handle: Handle) -> FlowResult<()> {
        match handle_tag(handle) {
            SCHEDULER_TAG => {
                let scheduler = lock(&self.schedulers).remove(handle)?;
                scheduler.shutdown();
            }
            PUBLISHER_TAG => {
                let entry = lock(&self.publishers).remove(handle)?;
                if let (true, Some(emitter)) = (entry.owns_emitter, entry.emitter) {
                    emitter.complete();
                }
            }
            PIPELINE_TAG => {
                lock(&self.pipelines).remove(handle)?;
            }
            SUBSCRIPTION_TAG => {
                let subscription = lock(&self.subscriptions).remove(handle)?;
                subscription.cancel();
            }
            _ => return Err(FlowError::InvalidHandle(handle)),
        }
        Ok(())
    }

    // --- named signals ----------------------------------------------------

    pub fn register_signal(&self, name: &str) -> FlowResult<()> {
        validate_signal_name(name)?;
        self.hub.get_or_create(name);
        Ok(())
    }

    /// Removes the signal, completing its connections.
    pub fn unregister_signal(&self, name: &str) -> FlowResult<bool> {
        validate_signal_name(name)?;
        Ok(self.hub.unregister(name))
    }

    pub fn emit_signal(&self, name: &str, payload: Payload) -> FlowResult<usize> {
        validate_signal_name(name)?;
        Ok(self.hub.emit(name, payload))
    }

    /// Connects a subscriber with unbounded demand; returns its subscription handle.
    pub fn connect_signal(
        &self,
        name: &str,
        subscriber: impl Subscriber<Payload> + 'static,
        scheduler: Handle,
    ) -> FlowResult<Handle> {
        validate_signal_name(name)?;
        let scheduler = self.scheduler(scheduler)?;
        let subscription = self.hub.connect(name, subscriber, &scheduler)?;
        lock(&self.subscriptions).insert(subscription)
    }

    pub fn disconnect_signal(&self, name: &str) -> FlowResult<usize> {
        validate_signal_name(name)?;
        Ok(self.hub.disconnect_all(name))
    }

    pub fn signal_count(&self) -> usize {
        self.hub.count()
    }

    pub fn signal_names(&self) -> Vec<String> {
        self.hub.names()
    }

    /// Cancels every subscription and shuts every scheduler down.
    pub fn shutdown(&self) -> Vec<ShutdownOutcome> {
        let subscriptions = lock(&self.subscriptions).drain();
        for subscription in subscriptions {
            subscription.cancel();
        }
        lock(&self.pipelines).drain();
        let publishers = lock(&self.publishers).drain();
        for entry in publishers {
            if let (true, Some(emitter)) = (entry.owns_emitter, entry.emitter) {
                emitter.complete();
            }
        }
        let schedulers = lock(&self.schedulers).drain();
        schedulers.iter().map(Scheduler::shutdown).collect()
    }

    /// Live handle counts: (schedulers, publishers, pipelines, subscriptions).
    pub fn live_handles(&self) -> (usize, usize, usize, usize) {
        (
            lock(&self.schedulers).len(),
            lock(&self.publishers).len(),
            lock(&self.pipelines).len(),
            lock(&self.subscriptions).len(),
        )
    }
}

fn validate_signal_name(name: &str) -> FlowResult<()> {
    if name.is_empty() {
        return Err(FlowError::InvalidArgument("signal name is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CallbackSubscriber;
    use std::sync::{mpsc, Arc};

    const WAIT: Duration = Duration::from_secs(5);

    fn text_sink() -> (CallbackSubscriber<Payload>, mpsc::Receiver<Option<String>>) {
        let (tx, rx) = mpsc::channel();
        let done = tx.clone();
        let failed = tx.clone();
        let subscriber = CallbackSubscriber::new(
            move |payload: Payload| tx.send(Some(String::from_utf8(payload).unwrap())).unwrap(),
            move || done.send(None).unwrap(),
            move |e| failed.send(Some(format!("error: {}", e))).unwrap(),
        );
        (subscriber, rx)
    }

    fn collect(rx: &mpsc::Receiver<Option<String>>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(value) = rx.recv_timeout(WAIT).unwrap() {
            out.push(value);
        }
        out
    }

    #[test]
    fn sequence_through_named_operators() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Serial).unwrap();
        let source = bridge
            .create_publisher("sequence", r#"{"values": ["a", "", "bc"]}"#)
            .unwrap();
        let pipeline = bridge
            .create_pipeline_json(
                source,
                r#"[{"op": "filter", "predicate": {"name": "non_empty"}},
                    {"op": "map", "transform": {"name": "uppercase"}},
                    {"op": "map", "transform": {"name": "suffix", "value": "!"}}]"#,
            )
            .unwrap();
        let (subscriber, rx) = text_sink();
        let subscription = bridge.subscribe(pipeline, subscriber, scheduler).unwrap();
        bridge.request(subscription, 10).unwrap();

        assert_eq!(collect(&rx), vec!["A!", "BC!"]);
        assert_eq!(
            bridge.subscription_state(subscription).unwrap(),
            SubscriptionState::Completed
        );
        bridge.dispose(subscription).unwrap();
        bridge.dispose(scheduler).unwrap();
    }

    #[test]
    fn external_publisher_is_driven_by_emit() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Immediate).unwrap();
        let source = bridge.create_publisher("external", "{}").unwrap();
        let (subscriber, rx) = text_sink();
        let subscription = bridge.subscribe(source, subscriber, scheduler).unwrap();
        bridge.request(subscription, u64::MAX).unwrap();

        assert_eq!(bridge.emit(source, b"one".to_vec()).unwrap(), 1);
        assert_eq!(bridge.emit(source, b"two".to_vec()).unwrap(), 1);
        bridge.dispose(source).unwrap();
        assert_eq!(collect(&rx), vec!["one", "two"]);
    }

    #[test]
    fn merge_accepts_handles_and_inline_sources() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Immediate).unwrap();
        let left = bridge.create_publisher("sequence", r#"{"values": ["l1", "l2"]}"#).unwrap();
        let right = bridge.create_publisher("just", r#"{"value": "r1"}"#).unwrap();
        let merge = format!(
            r#"[{{"op": "merge", "sources": [{}, {{"kind": "just", "value": "aW4="}}]}}]"#,
            right
        );
        // The inline source is utf8 by default, so the base64 text passes through.
        let pipeline = bridge.create_pipeline_json(left, &merge).unwrap();
        let (subscriber, rx) = text_sink();
        let subscription = bridge.subscribe(pipeline, subscriber, scheduler).unwrap();
        bridge.request(subscription, 10).unwrap();
        assert_eq!(collect(&rx), vec!["l1", "r1", "aW4=", "l2"]);
    }

    #[test]
    fn stale_and_foreign_handles_are_rejected() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Immediate).unwrap();
        let source = bridge.create_publisher("empty", "").unwrap();

        assert_eq!(bridge.request(source, 1), Err(FlowError::InvalidHandle(source)));
        assert!(matches!(
            bridge.subscribe(scheduler, CallbackSubscriber::values(|_| {}), scheduler),
            Err(FlowError::InvalidHandle(_))
        ));
        assert!(matches!(bridge.emit(source, Vec::new()), Err(FlowError::InvalidArgument(_))));

        bridge.dispose(source).unwrap();
        assert_eq!(bridge.dispose(source), Err(FlowError::InvalidHandle(source)));
        assert_eq!(bridge.dispose(0), Err(FlowError::InvalidHandle(0)));
        assert_eq!(bridge.dispose(u64::MAX), Err(FlowError::InvalidHandle(u64::MAX)));
    }

    #[test]
    fn disposing_a_terminal_subscription_is_a_no_op() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Immediate).unwrap();
        let source = bridge.create_publisher("just", r#"{"value": "x"}"#).unwrap();
        let (subscriber, rx) = text_sink();
        let subscription = bridge.subscribe(source, subscriber, scheduler).unwrap();
        bridge.request(subscription, 1).unwrap();
        assert_eq!(collect(&rx), vec!["x"]);

        bridge.cancel(subscription).unwrap();
        bridge.dispose(subscription).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.live_handles().3, 0);
    }

    #[test]
    fn invalid_operator_parameters_are_rejected() {
        let bridge = Bridge::new();
        let source = bridge.create_publisher("empty", "").unwrap();
        for ops in [
            r#"[{"op": "buffer", "capacity": 0}]"#,
            r#"[{"op": "debounce", "interval_ms": 0}]"#,
            r#"[{"op": "merge", "sources": []}]"#,
            r#"[{"op": "explode"}]"#,
            "not json",
        ] {
            assert!(
                matches!(bridge.create_pipeline_json(source, ops), Err(FlowError::InvalidArgument(_))),
                "{}",
                ops
            );
        }
        assert!(matches!(
            bridge.create_scheduler(SchedulerKind::Concurrent { workers: 0 }),
            Err(FlowError::InvalidArgument(_))
        ));
    }

    #[test]
    fn signals_multicast_to_connections() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Immediate).unwrap();
        bridge.register_signal("greetings").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let sink = Arc::clone(&seen);
            bridge
                .connect_signal(
                    "greetings",
                    CallbackSubscriber::values(move |p: Payload| sink.lock().unwrap().push(p)),
                    scheduler,
                )
                .unwrap();
        }
        assert_eq!(bridge.emit_signal("greetings", b"hi".to_vec()).unwrap(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(bridge.signal_names(), vec!["greetings".to_string()]);
        assert!(bridge.unregister_signal("greetings").unwrap());
        assert_eq!(bridge.signal_count(), 0);
        assert!(matches!(bridge.register_signal(""), Err(FlowError::InvalidArgument(_))));
    }

    #[test]
    fn signal_publisher_survives_disconnect() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Immediate).unwrap();
        let source = bridge.create_publisher("signal", r#"{"name": "ticks"}"#).unwrap();
        let (early, early_rx) = text_sink();
        let first = bridge.subscribe(source, early, scheduler).unwrap();
        bridge.request(first, u64::MAX).unwrap();

        assert_eq!(bridge.disconnect_signal("ticks").unwrap(), 1);
        assert_eq!(collect(&early_rx), Vec::<String>::new());

        let (late, late_rx) = text_sink();
        let second = bridge.subscribe(source, late, scheduler).unwrap();
        bridge.request(second, u64::MAX).unwrap();
        assert_eq!(
            bridge.subscription_state(second).unwrap(),
            SubscriptionState::Active
        );

        assert_eq!(bridge.emit_signal("ticks", b"x".to_vec()).unwrap(), 1);
        assert_eq!(bridge.emit(source, b"y".to_vec()).unwrap(), 1);
        assert_eq!(late_rx.recv_timeout(WAIT).unwrap(), Some("x".to_string()));
        assert_eq!(late_rx.recv_timeout(WAIT).unwrap(), Some("y".to_string()));
    }

    #[test]
    fn shutdown_releases_everything() {
        let bridge = Bridge::new();
        let scheduler = bridge.create_scheduler(SchedulerKind::Concurrent { workers: 2 }).unwrap();
        let source = bridge.create_publisher("external", "").unwrap();
        let (subscriber, _rx) = text_sink();
        bridge.subscribe(source, subscriber, scheduler).unwrap();
        let outcomes = bridge.shutdown();
        assert_eq!(outcomes, vec![ShutdownOutcome::Drained]);
        assert_eq!(bridge.live_handles(), (0, 0, 0, 0));
    }
}
