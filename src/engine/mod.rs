// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Demand-driven stream engine.
//!
//! * [`Publisher`] - description of a source and its operators
//! * [`Subscription`] - one binding of a publisher to a [`Subscriber`](crate::traits::Subscriber)
//! * [`Pipeline`] - builder pairing a publisher with its [`Scheduler`](crate::scheduler::Scheduler)
//! * [`Emitter`] - push side of an external source
//!
//! Values only flow against demand signalled through
//! [`Subscription::request`]. Every stage that holds values holds a bounded
//! number of them.

pub mod demand;
pub mod external;
pub mod operators;
pub mod pipeline;
pub mod publisher;
pub mod signal;
pub(crate) mod stage;
pub mod subscription;

pub use demand::{DemandAdded, DemandCounter};
pub use external::Emitter;
pub use operators::{BufferConfig, OverflowPolicy};
pub use pipeline::Pipeline;
pub use publisher::{FilterFn, Item, MapFn, Operator, Publisher};
pub use signal::Signal;
pub use stage::Terminal;
pub use subscription::{Subscription, SubscriptionState, SubscriptionStats};

#[cfg(test)]
mod integration_tests;
