// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout flowbridge. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names consistent between the human-readable line and structured fields
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::subscription` - Subscription lifecycle, demand and delivery events
//! * `messages::scheduler` - Scheduler lifecycle, shutdown and task failures
//! * `messages::operator` - Stateful operator events (overflow, timers)
//! * `messages::bridge` - Handle table and boundary call events
//!
//! # Usage
//!
//! ```rust
//! use flowbridge::observability::messages::{scheduler::SchedulerStarted, StructuredLog};
//!
//! let msg = SchedulerStarted {
//!     name: "pipeline-serial",
//!     strategy: "serial",
//!     workers: 1,
//! };
//!
//! msg.log();
//! ```

pub mod messages;
