// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! `StructuredLog` to emit the event at its documented level with the same
//! data attached as `tracing` fields.
//!
//! # Organization
//!
//! * `subscription` - Subscription lifecycle, demand and delivery events
//! * `scheduler` - Scheduler lifecycle, shutdown and task failures
//! * `operator` - Stateful operator events
//! * `bridge` - Handle table and boundary call events

use tracing::Span;

pub mod bridge;
pub mod operator;
pub mod scheduler;
pub mod subscription;

/// Emits a message at its documented level with structured fields.
pub trait StructuredLog: std::fmt::Display {
    fn log(&self);

    /// Opens a span carrying the message's identifying fields.
    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("flowbridge", span_name = name)
    }
}
