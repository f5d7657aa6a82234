// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Turns source and operator specs into publishers.
//!
//! Used by [`Bridge`](crate::bridge::Bridge) for handle-based pipelines and by
//! the config runtime builder for self-contained ones. Omitted buffer fields
//! are filled from [`BridgeSettings`].

use std::time::Duration;

use crate::bridge::{BridgeSettings, MergeSource, NamedOperatorFactory, OperatorSpec, Payload, SourceSpec};
use crate::engine::{BufferConfig, Publisher};
use crate::errors::{FlowError, FlowResult};

/// Builds a self-contained source. External and signal sources need a
/// registered emitter and are rejected.
pub fn source_publisher(spec: &SourceSpec) -> FlowResult<Publisher<Payload>> {
    let publisher = match spec {
        SourceSpec::Just { value, encoding } => Publisher::just(encoding.decode(value)?),
        SourceSpec::Sequence { values, encoding } => {
            let values = values
                .iter()
                .map(|value| encoding.decode(value))
                .collect::<FlowResult<Vec<_>>>()?;
            Publisher::sequence(values)
        }
        SourceSpec::Empty => Publisher::empty(),
        SourceSpec::External { .. } | SourceSpec::Signal { .. } => {
            return Err(FlowError::InvalidArgument(format!(
                "'{}' sources must be created as publisher handles",
                spec.kind()
            )))
        }
    };
    Ok(publisher)
}

/// Resolves merge sources from inline specs only.
pub fn inline_merge_source(source: &MergeSource) -> FlowResult<Publisher<Payload>> {
    match source {
        MergeSource::Inline(spec) => source_publisher(spec),
        MergeSource::Handle(handle) => Err(FlowError::InvalidArgument(format!(
            "merge source {:#x} is a handle; only inline sources are available here",
            handle
        ))),
    }
}

/// Applies one operator spec. `merge_source` turns each merge source into a
/// publisher.
pub fn apply_operator(
    publisher: Publisher<Payload>,
    spec: &OperatorSpec,
    settings: &BridgeSettings,
    mut merge_source: impl FnMut(&MergeSource) -> FlowResult<Publisher<Payload>>,
) -> FlowResult<Publisher<Payload>> {
    let applied = match spec {
        OperatorSpec::Map { transform } => publisher.map_with(NamedOperatorFactory::transform(transform)),
        OperatorSpec::Filter { predicate } => {
            publisher.filter_with(NamedOperatorFactory::predicate(predicate))
        }
        OperatorSpec::Buffer { capacity, overflow } => {
            let capacity = capacity.unwrap_or(settings.buffer.capacity);
            if capacity == 0 {
                return Err(FlowError::InvalidArgument(
                    "buffer capacity must be positive".into(),
                ));
            }
            publisher.buffer(BufferConfig::new(
                capacity,
                overflow.unwrap_or(settings.buffer.overflow),
            ))
        }
        OperatorSpec::Merge { sources } => {
            if sources.is_empty() {
                return Err(FlowError::InvalidArgument(
                    "merge needs at least one source".into(),
                ));
            }
            let others = sources
                .iter()
                .map(&mut merge_source)
                .collect::<FlowResult<Vec<_>>>()?;
            publisher.merge(others)
        }
        OperatorSpec::Debounce { interval_ms } => {
            if *interval_ms == 0 {
                return Err(FlowError::InvalidArgument(
                    "debounce interval_ms must be positive".into(),
                ));
            }
            publisher.debounce(Duration::from_millis(*interval_ms))
        }
    };
    Ok(applied)
}
