// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation.
//!
//! Validation runs every check and accumulates the failures, so a user sees
//! all problems in one pass rather than fixing them one at a time.
//!
//! Checks:
//!
//! 1. **Engine sections**: worker count, buffer and external queue
//!    capacities, and drain budget must be positive when given.
//! 2. **Pipeline source**: the source must be self-contained; `external` and
//!    `signal` sources need a host and are rejected.
//! 3. **Operators**: buffer capacities and debounce intervals must be
//!    positive, merges need at least one source, and merge sources must be
//!    inline (publisher handles only exist at runtime).
//!
//! # Examples
//!
//! ```rust
//! use flowbridge::config::{validate_config, EngineConfig};
//! use flowbridge::errors::ValidationError;
//!
//! let config: EngineConfig = serde_yaml::from_str("drain_budget: 0").unwrap();
//! let errors = validate_config(&config).unwrap_err();
//! assert_eq!(errors, vec![ValidationError::ZeroDrainBudget]);
//! ```

use crate::bridge::{MergeSource, OperatorSpec, SourceSpec};
use crate::config::{EngineConfig, PipelineConfig, Strategy};
use crate::errors::ValidationError;

/// Validates a configuration, returning every error found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_engine_sections(config, &mut errors);
    if let Some(pipeline) = &config.pipeline {
        validate_pipeline(pipeline, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_engine_sections(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
    if config.scheduler.strategy == Strategy::Concurrent && config.scheduler.workers == Some(0) {
        errors.push(ValidationError::ZeroWorkers);
    }
    if config.buffer.capacity == Some(0) {
        errors.push(ValidationError::ZeroCapacity {
            location: "buffer".to_string(),
        });
    }
    if config.external.queue_capacity == Some(0) {
        errors.push(ValidationError::ZeroCapacity {
            location: "external".to_string(),
        });
    }
    if config.drain_budget == Some(0) {
        errors.push(ValidationError::ZeroDrainBudget);
    }
}

fn validate_pipeline(pipeline: &PipelineConfig, errors: &mut Vec<ValidationError>) {
    validate_source(&pipeline.source, "pipeline.source", errors);

    for (index, operator) in pipeline.operators.iter().enumerate() {
        let location = format!("pipeline.operators[{}]", index);
        match operator {
            OperatorSpec::Buffer {
                capacity: Some(0), ..
            } => errors.push(ValidationError::ZeroCapacity { location }),
            OperatorSpec::Debounce { interval_ms: 0 } => {
                errors.push(ValidationError::ZeroInterval { location })
            }
            OperatorSpec::Merge { sources } if sources.is_empty() => {
                errors.push(ValidationError::EmptyMerge { location })
            }
            OperatorSpec::Merge { sources } => {
                for (position, source) in sources.iter().enumerate() {
                    let source_location = format!("{}.sources[{}]", location, position);
                    match source {
                        MergeSource::Handle(handle) => {
                            errors.push(ValidationError::UnresolvedSource {
                                location: source_location,
                                handle: *handle,
                            })
                        }
                        MergeSource::Inline(spec) => validate_source(spec, &source_location, errors),
                    }
                }
            }
            _ => {}
        }
    }
}

fn validate_source(source: &SourceSpec, location: &str, errors: &mut Vec<ValidationError>) {
    if let SourceSpec::External { .. } | SourceSpec::Signal { .. } = source {
        errors.push(ValidationError::HostDrivenSource {
            location: location.to_string(),
            kind: source.kind().to_string(),
        });
    }
}
