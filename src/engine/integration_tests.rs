// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end behavior of pipelines across schedulers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Emitter, OverflowPolicy, Pipeline, Publisher, Subscription, SubscriptionState};
use crate::errors::FlowError;
use crate::scheduler::{Scheduler, ShutdownOutcome};
use crate::traits::Subscriber;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
enum Event<T> {
    Next(T),
    Complete,
    Error(FlowError),
}

struct Recorder<T> {
    tx: Sender<Event<T>>,
}

impl<T: Send> Subscriber<T> for Recorder<T> {
    fn on_next(&mut self, value: T) {
        let _ = self.tx.send(Event::Next(value));
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(Event::Complete);
    }

    fn on_error(&mut self, error: FlowError) {
        let _ = self.tx.send(Event::Error(error));
    }
}

fn recorder<T>() -> (Recorder<T>, Receiver<Event<T>>) {
    let (tx, rx) = mpsc::channel();
    (Recorder { tx }, rx)
}

/// Collects events up to and including the terminal one.
fn until_terminal<T>(rx: &Receiver<Event<T>>) -> (Vec<T>, Event<T>) {
    let mut values = Vec::new();
    loop {
        match rx.recv_timeout(WAIT).expect("stream should terminate") {
            Event::Next(v) => values.push(v),
            terminal => return (values, terminal),
        }
    }
}

#[test]
fn concurrent_scheduler_delivers_in_order_exactly_once() {
    let scheduler = Scheduler::concurrent(8).unwrap();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::sequence(1..=100), &scheduler)
        .subscribe(subscriber)
        .unwrap();
    for _ in 0..10 {
        subscription.request(10).unwrap();
    }
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, (1..=100).collect::<Vec<_>>());
    assert_eq!(terminal, Event::Complete);
    assert_eq!(subscription.stats().delivered, 100);
    assert_eq!(scheduler.shutdown(), ShutdownOutcome::Drained);
}

#[test]
fn many_subscriptions_share_a_concurrent_pool() {
    let scheduler = Scheduler::concurrent(4).unwrap();
    let pipeline = Pipeline::new(Publisher::sequence(0..50), &scheduler).map(|v| v * 2);
    let mut receivers = Vec::new();
    for _ in 0..16 {
        let (subscriber, rx) = recorder();
        let subscription = pipeline.subscribe(subscriber).unwrap();
        subscription.request(u64::MAX).unwrap();
        receivers.push((subscription, rx));
    }
    for (_subscription, rx) in &receivers {
        let (values, terminal) = until_terminal(rx);
        assert_eq!(values, (0..50).map(|v| v * 2).collect::<Vec<_>>());
        assert_eq!(terminal, Event::Complete);
    }
    scheduler.shutdown();
}

#[test]
fn buffer_drop_oldest_keeps_latest_values() {
    let scheduler = Scheduler::immediate().unwrap();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::sequence(vec![1, 2, 3]), &scheduler)
        .buffer(2, OverflowPolicy::DropOldest)
        .subscribe(subscriber)
        .unwrap();
    // Nothing is requested until the buffer has absorbed the whole source.
    subscription.request(2).unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![2, 3]);
    assert_eq!(terminal, Event::Complete);
}

#[test]
fn buffer_drop_newest_keeps_earliest_values() {
    let scheduler = Scheduler::immediate().unwrap();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::sequence(vec![1, 2, 3]), &scheduler)
        .buffer(2, OverflowPolicy::DropNewest)
        .subscribe(subscriber)
        .unwrap();
    // Nothing is requested until the buffer has absorbed the whole source.
    subscription.request(2).unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![1, 2]);
    assert_eq!(terminal, Event::Complete);
}

#[test]
fn buffer_absorbs_external_values_without_demand() {
    let scheduler = Scheduler::serial().unwrap();
    let emitter = Emitter::new();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .buffer(2, OverflowPolicy::DropOldest)
        .subscribe(subscriber)
        .unwrap();
    for v in 1..=5 {
        emitter.emit(v);
    }
    emitter.complete();
    // Let the worker absorb everything before demand arrives.
    std::thread::sleep(Duration::from_millis(50));
    subscription.request(10).unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![4, 5]);
    assert_eq!(terminal, Event::Complete);
    scheduler.shutdown();
}

#[test]
fn buffer_fail_policy_fails_the_subscription() {
    let scheduler = Scheduler::immediate().unwrap();
    let (subscriber, rx) = recorder::<i32>();
    let subscription = Pipeline::new(Publisher::sequence(vec![1, 2, 3]), &scheduler)
        .buffer(2, OverflowPolicy::FailSubscription)
        .subscribe(subscriber)
        .unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert!(values.is_empty());
    assert!(matches!(terminal, Event::Error(FlowError::OperatorFailure(_))));
    assert_eq!(subscription.state(), SubscriptionState::Failed);
}

#[test]
fn merge_alternates_between_sources() {
    let scheduler = Scheduler::serial().unwrap();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::sequence(vec!["a1", "a2", "a3"]), &scheduler)
        .merge(vec![Publisher::sequence(vec!["b1", "b2", "b3"])])
        .subscribe(subscriber)
        .unwrap();
    subscription.request(6).unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec!["a1", "b1", "a2", "b2", "a3", "b3"]);
    assert_eq!(terminal, Event::Complete);
    scheduler.shutdown();
}

#[test]
fn merge_of_external_sources_interleaves_as_values_arrive() {
    let scheduler = Scheduler::immediate().unwrap();
    let left = Emitter::new();
    let right = Emitter::new();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::external(&left), &scheduler)
        .merge(vec![Publisher::external(&right)])
        .subscribe(subscriber)
        .unwrap();
    subscription.request(u64::MAX).unwrap();
    right.emit(1);
    left.emit(2);
    right.emit(3);
    left.complete();
    assert_eq!(subscription.state(), SubscriptionState::Active);
    right.complete();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(terminal, Event::Complete);
}

#[test]
fn filter_re_requests_rejected_values() {
    let scheduler = Scheduler::immediate().unwrap();
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let source = Publisher::from_iter_once((1..=10).inspect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(source, &scheduler)
        .filter(|v| v % 2 == 0)
        .subscribe(subscriber)
        .unwrap();
    subscription.request(5).unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![2, 4, 6, 8, 10]);
    assert_eq!(terminal, Event::Complete);
    assert_eq!(pulled.load(Ordering::SeqCst), 10);
}

#[test]
fn once_source_rejects_a_second_subscriber() {
    let scheduler = Scheduler::immediate().unwrap();
    let pipeline = Pipeline::new(Publisher::from_iter_once(vec![1, 2, 3]), &scheduler);
    let (first, _rx) = recorder();
    pipeline.subscribe(first).unwrap();
    let (second, _rx) = recorder();
    assert!(matches!(
        pipeline.subscribe(second),
        Err(FlowError::AlreadyTerminated)
    ));
}

#[test]
fn debounce_flushes_pending_value_on_completion() {
    let scheduler = Scheduler::serial().unwrap();
    let emitter = Emitter::new();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .debounce(Duration::from_secs(10))
        .subscribe(subscriber)
        .unwrap();
    subscription.request(u64::MAX).unwrap();
    for v in 1..=3 {
        emitter.emit(v);
    }
    emitter.complete();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![3]);
    assert_eq!(terminal, Event::Complete);
    scheduler.shutdown();
}

#[test]
fn debounce_emits_after_quiet_interval() {
    let scheduler = Scheduler::concurrent(2).unwrap();
    let emitter = Emitter::new();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .debounce(Duration::from_millis(40))
        .subscribe(subscriber)
        .unwrap();
    subscription.request(u64::MAX).unwrap();

    emitter.emit("burst-1");
    emitter.emit("burst-2");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Event::Next("burst-2"));

    emitter.emit("single");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Event::Next("single"));

    subscription.cancel();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    scheduler.shutdown();
}

#[test]
fn cancel_is_idempotent_and_silent() {
    let scheduler = Scheduler::serial().unwrap();
    let emitter: Emitter<i32> = Emitter::new();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .subscribe(subscriber)
        .unwrap();
    subscription.request(1).unwrap();
    subscription.cancel();
    subscription.cancel();
    assert_eq!(subscription.state(), SubscriptionState::Cancelled);

    emitter.emit(1);
    emitter.complete();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(scheduler.shutdown(), ShutdownOutcome::Drained);
    assert_eq!(emitter.subscriber_count(), 0);
}

#[test]
fn racing_cancel_and_completion_yield_at_most_one_terminal() {
    let scheduler = Scheduler::concurrent(4).unwrap();
    let terminals = Arc::new(AtomicUsize::new(0));
    for _ in 0..200 {
        let (tx, rx) = mpsc::channel();
        let subscription =
            Subscription::subscribe(&Publisher::sequence(0..8), Recorder { tx }, &scheduler)
                .unwrap();
        let racer = subscription.clone();
        let handle = std::thread::spawn(move || racer.cancel());
        subscription.request(8).unwrap();
        handle.join().unwrap();

        std::thread::sleep(Duration::from_millis(1));
        let count = rx
            .try_iter()
            .filter(|event| !matches!(event, Event::Next(_)))
            .count();
        assert!(count <= 1, "saw {} terminal events", count);
        terminals.fetch_add(count, Ordering::SeqCst);
        assert!(subscription.is_terminated());
    }
    scheduler.shutdown();
}

#[test]
fn external_values_arrive_in_emission_order() {
    let scheduler = Scheduler::serial().unwrap();
    let emitter = Emitter::new();
    let (subscriber, rx) = recorder();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .map(|v: u32| v + 1)
        .subscribe(subscriber)
        .unwrap();
    subscription.request(u64::MAX).unwrap();
    let producer = {
        let emitter = emitter.clone();
        std::thread::spawn(move || {
            for v in 0..500 {
                emitter.emit(v);
            }
            emitter.complete();
        })
    };
    producer.join().unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, (1..=500).collect::<Vec<_>>());
    assert_eq!(terminal, Event::Complete);
    scheduler.shutdown();
}

#[test]
fn slow_subscriber_overflows_external_queue() {
    let scheduler = Scheduler::immediate().unwrap();
    let emitter = Emitter::with_queue(4, OverflowPolicy::FailSubscription);
    let (subscriber, rx) = recorder::<i32>();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .subscribe(subscriber)
        .unwrap();
    for v in 0..5 {
        emitter.emit(v);
    }
    let (values, terminal) = until_terminal(&rx);
    assert!(values.is_empty());
    assert!(matches!(terminal, Event::Error(FlowError::OperatorFailure(_))));
    assert_eq!(subscription.state(), SubscriptionState::Failed);
    assert_eq!(emitter.subscriber_count(), 0);
}

#[test]
fn source_failure_reaches_the_subscriber() {
    let scheduler = Scheduler::immediate().unwrap();
    let (subscriber, rx) = recorder::<i32>();
    let cause = FlowError::SourceFailure("socket closed".into());
    Pipeline::new(Publisher::fail(cause.clone()), &scheduler)
        .map(|v| v + 1)
        .subscribe(subscriber)
        .unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert!(values.is_empty());
    assert_eq!(terminal, Event::Error(cause));
}

#[test]
fn unbounded_source_does_not_starve_the_serial_worker() {
    let scheduler = Scheduler::serial().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let endless = Pipeline::new(Publisher::from_iter_once(0u64..), &scheduler)
        .with_drain_budget(32)
        .subscribe(crate::traits::CallbackSubscriber::values(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }))
        .unwrap();
    endless.request(u64::MAX).unwrap();

    let (subscriber, rx) = recorder();
    let finite = Pipeline::new(Publisher::sequence(0u64..3), &scheduler)
        .subscribe(subscriber)
        .unwrap();
    finite.request(3).unwrap();
    let (values, terminal) = until_terminal(&rx);
    assert_eq!(values, vec![0, 1, 2]);
    assert_eq!(terminal, Event::Complete);

    endless.cancel();
    assert!(seen.load(Ordering::Relaxed) > 0);
    assert_eq!(scheduler.shutdown(), ShutdownOutcome::Drained);
}

#[test]
fn requests_fail_after_scheduler_shutdown() {
    let scheduler = Scheduler::serial().unwrap();
    let (subscriber, _rx) = recorder::<i32>();
    let emitter = Emitter::new();
    let subscription = Pipeline::new(Publisher::external(&emitter), &scheduler)
        .subscribe(subscriber)
        .unwrap();
    scheduler.shutdown();
    assert_eq!(subscription.request(1), Err(FlowError::SchedulerShutdown));
}

#[test]
fn immediate_buffer_over_endless_source_returns_without_demand() {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let scheduler = Scheduler::immediate().unwrap();
        let (subscriber, values) = recorder();
        let subscription = Pipeline::new(Publisher::from_iter_once(0u64..), &scheduler)
            .buffer(4, OverflowPolicy::DropOldest)
            .subscribe(subscriber)
            .unwrap();
        assert_eq!(subscription.state(), SubscriptionState::Active);

        subscription.request(3).unwrap();
        let delivered: Vec<u64> = values
            .try_iter()
            .map(|event| match event {
                Event::Next(v) => v,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        subscription.cancel();
        tx.send(delivered).unwrap();
    });

    let delivered = rx.recv_timeout(WAIT).expect("subscribe and request should return");
    assert_eq!(delivered.len(), 3);
    assert!(delivered.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn immediate_debounce_over_endless_source_returns_without_demand() {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let scheduler = Scheduler::immediate().unwrap();
        let (subscriber, _values) = recorder::<u64>();
        let subscription = Pipeline::new(Publisher::from_iter_once(0u64..), &scheduler)
            .debounce(Duration::from_secs(60))
            .subscribe(subscriber)
            .unwrap();
        subscription.cancel();
        tx.send(subscription.state()).unwrap();
    });

    assert_eq!(
        rx.recv_timeout(WAIT).expect("subscribe should return"),
        SubscriptionState::Cancelled
    );
}
