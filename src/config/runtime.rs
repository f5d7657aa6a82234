// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::compose::{apply_operator, inline_merge_source, source_publisher};
use crate::bridge::Payload;
use crate::config::{EngineConfig, PipelineConfig};
use crate::engine::{Pipeline, Publisher};
use crate::errors::{FlowError, FlowResult};
use crate::scheduler::Scheduler;

/// Builds a runnable scheduler and pipeline from configuration.
///
/// # Examples
///
/// ```
/// use flowbridge::config::{EngineConfig, RuntimeBuilder};
/// use flowbridge::traits::CallbackSubscriber;
/// use std::sync::mpsc;
///
/// let config: EngineConfig = serde_yaml::from_str(r#"
/// scheduler: { strategy: immediate }
/// pipeline:
///   source: { kind: sequence, values: ["a", "b"] }
///   operators:
///     - op: map
///       transform: { name: uppercase }
/// "#).unwrap();
///
/// let (scheduler, pipeline) = RuntimeBuilder::from_config(&config).unwrap();
/// let (tx, rx) = mpsc::channel();
/// let subscription = pipeline
///     .subscribe(CallbackSubscriber::values(move |v: Vec<u8>| tx.send(v).unwrap()))
///     .unwrap();
/// subscription.request(2).unwrap();
/// assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![b"A".to_vec(), b"B".to_vec()]);
/// scheduler.shutdown();
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build the configured scheduler and pipeline.
    ///
    /// Fails with [`FlowError::Config`] when the config has no pipeline section.
    pub fn from_config(cfg: &EngineConfig) -> FlowResult<(Scheduler, Pipeline<Payload>)> {
        let pipeline_cfg = cfg
            .pipeline
            .as_ref()
            .ok_or_else(|| FlowError::Config("no pipeline section configured".to_string()))?;
        let publisher = Self::publisher(cfg, pipeline_cfg)?;
        let scheduler = Scheduler::from_config(&cfg.scheduler)?;
        let pipeline = Pipeline::new(publisher, &scheduler).with_drain_budget(cfg.get_drain_budget());
        Ok((scheduler, pipeline))
    }

    /// Compose the pipeline's publisher, applying the config's buffer defaults.
    pub fn publisher(cfg: &EngineConfig, pipeline: &PipelineConfig) -> FlowResult<Publisher<Payload>> {
        let settings = cfg.bridge_settings();
        let mut publisher = source_publisher(&pipeline.source)?;
        for operator in &pipeline.operators {
            publisher = apply_operator(publisher, operator, &settings, inline_merge_source)?;
        }
        Ok(publisher)
    }
}
