// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur during engine configuration validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A bounded queue was configured with zero capacity
    ZeroCapacity {
        /// Where the capacity was configured (e.g. "buffer", "operators[2]")
        location: String,
    },
    /// A concurrent scheduler was configured without workers
    ZeroWorkers,
    /// The drain budget must allow at least one pull per pass
    ZeroDrainBudget,
    /// A debounce operator was configured with a zero interval
    ZeroInterval {
        /// Position of the operator in the pipeline
        location: String,
    },
    /// A merge operator has no upstream sources
    EmptyMerge {
        /// Position of the operator in the pipeline
        location: String,
    },
    /// A merge operator references a publisher handle, which only exists at runtime
    UnresolvedSource {
        /// Position of the operator in the pipeline
        location: String,
        /// The handle that cannot be resolved from configuration
        handle: u64,
    },
    /// A configured pipeline uses a source that only a host can drive
    HostDrivenSource {
        /// Where the source appears in the pipeline
        location: String,
        /// The source kind (`external` or `signal`)
        kind: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroCapacity { location } => {
                write!(f, "Capacity at '{}' must be greater than zero", location)
            }
            ValidationError::ZeroWorkers => {
                write!(f, "Concurrent scheduler requires at least one worker")
            }
            ValidationError::ZeroDrainBudget => {
                write!(f, "Drain budget must be greater than zero")
            }
            ValidationError::ZeroInterval { location } => {
                write!(f, "Debounce interval at '{}' must be greater than zero", location)
            }
            ValidationError::EmptyMerge { location } => {
                write!(f, "Merge at '{}' has no upstream sources", location)
            }
            ValidationError::UnresolvedSource { location, handle } => {
                write!(
                    f,
                    "Merge at '{}' references publisher handle {:#x}, which cannot be resolved from configuration",
                    location, handle
                )
            }
            ValidationError::HostDrivenSource { location, kind } => {
                write!(
                    f,
                    "Source at '{}' is '{}', which needs a host to emit values and cannot run from configuration",
                    location, kind
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
