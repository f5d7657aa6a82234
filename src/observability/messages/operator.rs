// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stateful operator events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// A bounded queue dropped a value according to its overflow policy.
///
/// # Log Level
/// `debug!` - Expected under sustained backpressure
///
/// # Example
/// ```
/// use flowbridge::observability::messages::operator::ValueDropped;
///
/// let msg = ValueDropped {
///     stage: "buffer",
///     capacity: 2,
///     policy: "drop_oldest",
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct ValueDropped<'a> {
    pub stage: &'a str,
    pub capacity: usize,
    pub policy: &'a str,
}

impl Display for ValueDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} at capacity {} dropped a value ({})",
            self.stage, self.capacity, self.policy
        )
    }
}

impl StructuredLog for ValueDropped<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            capacity = self.capacity,
            policy = self.policy,
            "{}", self
        );
    }
}

/// A debounce window was (re)armed.
///
/// # Log Level
/// `trace!` - High-frequency timer detail
pub struct DebounceArmed {
    pub delay: Duration,
}

impl Display for DebounceArmed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Debounce window armed for {:?}", self.delay)
    }
}

impl StructuredLog for DebounceArmed {
    fn log(&self) {
        tracing::trace!(delay_us = self.delay.as_micros() as u64, "{}", self);
    }
}
