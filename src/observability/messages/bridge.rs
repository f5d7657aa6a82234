// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the handle table and boundary calls.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A handle was issued for a newly registered object.
///
/// # Log Level
/// `debug!` - Per-object lifecycle event
pub struct HandleIssued<'a> {
    pub table: &'a str,
    pub handle: u64,
}

impl Display for HandleIssued<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Issued {} handle {:#x}", self.table, self.handle)
    }
}

impl StructuredLog for HandleIssued<'_> {
    fn log(&self) {
        tracing::debug!(table = self.table, handle = self.handle, "{}", self);
    }
}

/// A handle was disposed and its slot released.
///
/// # Log Level
/// `debug!` - Per-object lifecycle event
pub struct HandleDisposed<'a> {
    pub table: &'a str,
    pub handle: u64,
}

impl Display for HandleDisposed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Disposed {} handle {:#x}", self.table, self.handle)
    }
}

impl StructuredLog for HandleDisposed<'_> {
    fn log(&self) {
        tracing::debug!(table = self.table, handle = self.handle, "{}", self);
    }
}

/// A boundary call returned a non-zero status.
///
/// # Log Level
/// `debug!` - The caller receives the status code; this is diagnostic only
///
/// # Example
/// ```
/// use flowbridge::errors::FlowError;
/// use flowbridge::observability::messages::bridge::BoundaryCallFailed;
///
/// let error = FlowError::InvalidHandle(0x1_0000_0001);
/// let msg = BoundaryCallFailed {
///     call: "request",
///     error: &error,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct BoundaryCallFailed<'a> {
    pub call: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for BoundaryCallFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Boundary call '{}' failed: {}", self.call, self.error)
    }
}

impl StructuredLog for BoundaryCallFailed<'_> {
    fn log(&self) {
        tracing::debug!(call = self.call, error = %self.error, "{}", self);
    }
}
