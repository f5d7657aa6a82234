// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error taxonomy shared by the engine and the bridge.
//!
//! Every `FlowError` maps onto exactly one `ErrorKind`, and every `ErrorKind`
//! onto one stable status code returned from boundary calls. Status code `0`
//! is reserved for success.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors surfaced by engine operations and carried by failed subscriptions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// An unknown or already disposed handle was referenced.
    #[error("Invalid handle: {0:#x}")]
    InvalidHandle(u64),

    /// A request would exceed the representable demand; the counter saturated.
    #[error("Demand overflow: outstanding demand saturated at u64::MAX")]
    DemandOverflow,

    /// The operation targeted a subscription or source past its terminal state.
    #[error("Already terminated")]
    AlreadyTerminated,

    /// Work was submitted to a scheduler that has been shut down.
    #[error("Scheduler has been shut down")]
    SchedulerShutdown,

    /// A stateful operator broke one of its invariants.
    #[error("Operator failure: {0}")]
    OperatorFailure(String),

    /// A publisher terminated its sequence with an error.
    #[error("Source failure: {0}")]
    SourceFailure(String),

    /// A boundary call received malformed input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An engine resource (worker runtime, timer driver) could not be created.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of `FlowError`, stable across the boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    InvalidHandle,
    DemandOverflow,
    AlreadyTerminated,
    SchedulerShutdown,
    OperatorFailure,
    SourceFailure,
    InvalidArgument,
    Config,
    Internal,
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            FlowError::DemandOverflow => ErrorKind::DemandOverflow,
            FlowError::AlreadyTerminated => ErrorKind::AlreadyTerminated,
            FlowError::SchedulerShutdown => ErrorKind::SchedulerShutdown,
            FlowError::OperatorFailure(_) => ErrorKind::OperatorFailure,
            FlowError::SourceFailure(_) => ErrorKind::SourceFailure,
            FlowError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FlowError::Config(_) => ErrorKind::Config,
            FlowError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for the status code of this error's kind.
    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }
}

impl ErrorKind {
    pub fn status_code(self) -> i32 {
        match self {
            ErrorKind::InvalidHandle => 1,
            ErrorKind::DemandOverflow => 2,
            ErrorKind::AlreadyTerminated => 3,
            ErrorKind::SchedulerShutdown => 4,
            ErrorKind::OperatorFailure => 5,
            ErrorKind::SourceFailure => 6,
            ErrorKind::InvalidArgument => 7,
            ErrorKind::Config => 8,
            ErrorKind::Internal => 9,
        }
    }

    pub fn from_status_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ErrorKind::InvalidHandle),
            2 => Some(ErrorKind::DemandOverflow),
            3 => Some(ErrorKind::AlreadyTerminated),
            4 => Some(ErrorKind::SchedulerShutdown),
            5 => Some(ErrorKind::OperatorFailure),
            6 => Some(ErrorKind::SourceFailure),
            7 => Some(ErrorKind::InvalidArgument),
            8 => Some(ErrorKind::Config),
            9 => Some(ErrorKind::Internal),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::InvalidArgument(err.to_string())
    }
}
