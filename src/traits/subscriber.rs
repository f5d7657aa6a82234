// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::FlowError;

/// Sink for one subscription's values and its single terminal event.
///
/// Callbacks for one subscription never overlap, but may run on any thread.
/// Implementations should not block for long: on the serial and concurrent
/// schedulers a blocked callback stalls other subscriptions sharing the worker.
pub trait Subscriber<T>: Send {
    fn on_next(&mut self, value: T);

    fn on_complete(&mut self);

    fn on_error(&mut self, error: FlowError);
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(FlowError) + Send>;

/// Subscriber assembled from three closures.
pub struct CallbackSubscriber<T> {
    on_next: NextFn<T>,
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl<T> CallbackSubscriber<T> {
    pub fn new(
        on_next: impl FnMut(T) + Send + 'static,
        on_complete: impl FnMut() + Send + 'static,
        on_error: impl FnMut(FlowError) + Send + 'static,
    ) -> Self {
        Self {
            on_next: Box::new(on_next),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }

    /// Subscriber that only observes values; terminal events are ignored.
    pub fn values(on_next: impl FnMut(T) + Send + 'static) -> Self {
        Self::new(on_next, || {}, |_| {})
    }
}

impl<T> Subscriber<T> for CallbackSubscriber<T> {
    fn on_next(&mut self, value: T) {
        (self.on_next)(value)
    }

    fn on_complete(&mut self) {
        (self.on_complete)()
    }

    fn on_error(&mut self, error: FlowError) {
        (self.on_error)(error)
    }
}
