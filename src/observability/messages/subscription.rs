// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for subscription lifecycle and demand events.
//!
//! This module contains message types for logging events related to:
//! * Subscription activation and terminal transitions
//! * Demand accounting (including saturation)
//! * Drain pass scheduling

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A subscription was bound and activated.
///
/// # Log Level
/// `debug!` - Per-subscription lifecycle event
///
/// # Example
/// ```
/// use flowbridge::observability::messages::subscription::SubscriptionActivated;
///
/// let msg = SubscriptionActivated {
///     subscription_id: 7,
///     scheduler: "serial",
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct SubscriptionActivated<'a> {
    pub subscription_id: u64,
    pub scheduler: &'a str,
}

impl Display for SubscriptionActivated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscription {} activated on {} scheduler",
            self.subscription_id, self.scheduler
        )
    }
}

impl StructuredLog for SubscriptionActivated<'_> {
    fn log(&self) {
        tracing::debug!(
            subscription_id = self.subscription_id,
            scheduler = self.scheduler,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "subscription",
            span_name = name,
            subscription_id = self.subscription_id,
            scheduler = self.scheduler,
        )
    }
}

/// A subscription reached a terminal state.
///
/// # Log Level
/// `debug!` - Per-subscription lifecycle event
pub struct SubscriptionTerminated<'a> {
    pub subscription_id: u64,
    pub outcome: &'a str,
    pub delivered: u64,
}

impl Display for SubscriptionTerminated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscription {} {} after {} values",
            self.subscription_id, self.outcome, self.delivered
        )
    }
}

impl StructuredLog for SubscriptionTerminated<'_> {
    fn log(&self) {
        tracing::debug!(
            subscription_id = self.subscription_id,
            outcome = self.outcome,
            delivered = self.delivered,
            "{}", self
        );
    }
}

/// A subscription failed with a cause from an operator or publisher.
///
/// # Log Level
/// `warn!` - The stream ended abnormally; the subscriber receives the cause
///
/// # Example
/// ```
/// use flowbridge::errors::FlowError;
/// use flowbridge::observability::messages::subscription::SubscriptionFailed;
///
/// let error = FlowError::OperatorFailure("buffer overflow".into());
/// let msg = SubscriptionFailed {
///     subscription_id: 3,
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct SubscriptionFailed<'a> {
    pub subscription_id: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for SubscriptionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscription {} failed: {}",
            self.subscription_id, self.error
        )
    }
}

impl StructuredLog for SubscriptionFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            subscription_id = self.subscription_id,
            error = %self.error,
            "{}", self
        );
    }
}

/// A request pushed outstanding demand past the representable maximum.
///
/// # Log Level
/// `info!` - Saturation is not an error; the counter stays at its maximum
pub struct DemandSaturated {
    pub subscription_id: u64,
    pub requested: u64,
}

impl Display for DemandSaturated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscription {} demand saturated after request of {}",
            self.subscription_id, self.requested
        )
    }
}

impl StructuredLog for DemandSaturated {
    fn log(&self) {
        tracing::info!(
            subscription_id = self.subscription_id,
            requested = self.requested,
            "{}", self
        );
    }
}

/// A drain pass used up its pull budget and handed its worker back.
///
/// # Log Level
/// `trace!` - High-frequency scheduling detail
pub struct DrainYielded {
    pub subscription_id: u64,
    pub pulls: usize,
}

impl Display for DrainYielded {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscription {} yielded after {} upstream pulls",
            self.subscription_id, self.pulls
        )
    }
}

impl StructuredLog for DrainYielded {
    fn log(&self) {
        tracing::trace!(
            subscription_id = self.subscription_id,
            pulls = self.pulls,
            "{}", self
        );
    }
}

/// A drain pass could not be handed to the scheduler.
///
/// # Log Level
/// `warn!` - The subscription is detached from its scheduler
pub struct DrainRejected<'a> {
    pub subscription_id: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for DrainRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscription {} could not schedule delivery: {}",
            self.subscription_id, self.error
        )
    }
}

impl StructuredLog for DrainRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            subscription_id = self.subscription_id,
            error = %self.error,
            "{}", self
        );
    }
}

/// A subscriber callback panicked; the subscription is cancelled.
///
/// # Log Level
/// `error!` - Subscriber code is broken; delivery to it stops
pub struct SubscriberPanicked<'a> {
    pub subscription_id: u64,
    pub message: &'a str,
}

impl Display for SubscriberPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subscriber for subscription {} panicked: {}",
            self.subscription_id, self.message
        )
    }
}

impl StructuredLog for SubscriberPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            subscription_id = self.subscription_id,
            message = self.message,
            "{}", self
        );
    }
}
