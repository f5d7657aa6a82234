// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{BridgeSettings, OperatorSpec, SourceSpec};
use crate::config::consts::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_CONCURRENT_WORKERS, DEFAULT_DRAIN_BUDGET,
    DEFAULT_EXTERNAL_OVERFLOW, DEFAULT_EXTERNAL_QUEUE_CAPACITY, DEFAULT_OVERFLOW_POLICY,
    DEFAULT_SHUTDOWN_DEADLINE,
};
use crate::engine::{BufferConfig, OverflowPolicy};
use crate::errors::{FlowError, FlowResult};
use crate::scheduler::{SchedulerKind, SchedulerOptions};

/// Engine configuration, loaded from YAML (or TOML for `.toml` files).
///
/// Every section is optional; omitted values fall back to the constants in
/// [`crate::config::consts`].
///
/// # Example
/// ```yaml
/// scheduler:
///   strategy: concurrent
///   workers: 4
///   shutdown_deadline_ms: 2000
/// buffer:
///   capacity: 32
///   overflow: drop_newest
/// external:
///   queue_capacity: 256
/// drain_budget: 128
/// pipeline:
///   source:
///     kind: sequence
///     values: ["hello", "", "world"]
///   operators:
///     - op: filter
///       predicate: { name: non_empty }
///     - op: map
///       transform: { name: uppercase }
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub external: ExternalSettings,
    #[serde(default)]
    pub drain_budget: Option<usize>,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
}

impl EngineConfig {
    pub fn get_drain_budget(&self) -> usize {
        self.drain_budget.unwrap_or(DEFAULT_DRAIN_BUDGET)
    }

    /// Defaults for objects created through a bridge.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            buffer: self.buffer.to_buffer_config(),
            external_queue_capacity: self.external.get_queue_capacity(),
            external_overflow: self.external.get_overflow(),
            drain_budget: self.get_drain_budget(),
            shutdown_deadline: self.scheduler.get_shutdown_deadline(),
        }
    }
}

/// Delivery strategy for the configured scheduler.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Immediate,
    #[default]
    Serial,
    Concurrent,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub strategy: Strategy,
    /// Only read by the concurrent strategy.
    pub workers: Option<usize>,
    pub shutdown_deadline_ms: Option<u64>,
    /// Used in log lines; defaults to the strategy name.
    pub name: Option<String>,
}

impl SchedulerConfig {
    pub fn kind(&self) -> SchedulerKind {
        match self.strategy {
            Strategy::Immediate => SchedulerKind::Immediate,
            Strategy::Serial => SchedulerKind::Serial,
            Strategy::Concurrent => SchedulerKind::Concurrent {
                workers: self.workers.unwrap_or(DEFAULT_CONCURRENT_WORKERS),
            },
        }
    }

    pub fn get_shutdown_deadline(&self) -> Duration {
        self.shutdown_deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SHUTDOWN_DEADLINE)
    }

    pub fn options(&self) -> SchedulerOptions {
        SchedulerOptions {
            name: self.name.clone(),
            shutdown_deadline: self.get_shutdown_deadline(),
        }
    }
}

/// Defaults for buffer operators that omit capacity or policy.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BufferSettings {
    pub capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
}

impl BufferSettings {
    pub fn to_buffer_config(&self) -> BufferConfig {
        BufferConfig::new(
            self.capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
            self.overflow.unwrap_or(DEFAULT_OVERFLOW_POLICY),
        )
    }
}

/// Per-subscription queue bounds for externally driven sources.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExternalSettings {
    pub queue_capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
}

impl ExternalSettings {
    pub fn get_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_EXTERNAL_QUEUE_CAPACITY)
    }

    pub fn get_overflow(&self) -> OverflowPolicy {
        self.overflow.unwrap_or(DEFAULT_EXTERNAL_OVERFLOW)
    }
}

/// A self-contained pipeline: a source and the operators applied to it, in order.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub source: SourceSpec,
    #[serde(default)]
    pub operators: Vec<OperatorSpec>,
}

/// Load a config from a YAML file, or TOML when the extension is `.toml`.
pub fn load_config<P: AsRef<Path>>(path: P) -> FlowResult<EngineConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| FlowError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content)
            .map_err(|e| FlowError::Config(format!("invalid TOML in {}: {}", path.display(), e)))
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| FlowError::Config(format!("invalid YAML in {}: {}", path.display(), e)))
    }
}

/// Load a config and validate it, reporting every problem at once.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> FlowResult<EngineConfig> {
    let cfg = load_config(path)?;

    if let Err(validation_errors) = crate::config::validate_config(&cfg) {
        let error_messages: Vec<String> = validation_errors.iter().map(|e| e.to_string()).collect();
        return Err(FlowError::Config(format!(
            "Configuration validation failed:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{TransformSpec, ValueEncoding};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
scheduler:
  strategy: concurrent
  workers: 8
  shutdown_deadline_ms: 250
buffer:
  capacity: 2
  overflow: drop_newest
external:
  queue_capacity: 64
drain_budget: 32
pipeline:
  source:
    kind: sequence
    values: ["a", "b"]
  operators:
    - op: map
      transform: { name: reverse }
"#;
        let cfg: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scheduler.kind(), SchedulerKind::Concurrent { workers: 8 });
        assert_eq!(cfg.scheduler.get_shutdown_deadline(), Duration::from_millis(250));
        assert_eq!(
            cfg.buffer.to_buffer_config(),
            BufferConfig::new(2, OverflowPolicy::DropNewest)
        );
        assert_eq!(cfg.external.get_queue_capacity(), 64);
        assert_eq!(cfg.external.get_overflow(), OverflowPolicy::FailSubscription);
        assert_eq!(cfg.get_drain_budget(), 32);

        let pipeline = cfg.pipeline.unwrap();
        assert_eq!(
            pipeline.source,
            SourceSpec::Sequence {
                values: vec!["a".into(), "b".into()],
                encoding: ValueEncoding::Utf8,
            }
        );
        assert_eq!(
            pipeline.operators,
            vec![OperatorSpec::Map {
                transform: TransformSpec::Reverse
            }]
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: EngineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.scheduler.kind(), SchedulerKind::Serial);
        assert_eq!(cfg.bridge_settings(), BridgeSettings::default());
        assert!(cfg.pipeline.is_none());
    }

    #[test]
    fn concurrent_without_workers_uses_default_pool() {
        let cfg: EngineConfig = serde_yaml::from_str("scheduler: { strategy: concurrent }").unwrap();
        assert_eq!(
            cfg.scheduler.kind(),
            SchedulerKind::Concurrent {
                workers: DEFAULT_CONCURRENT_WORKERS
            }
        );
    }

    #[test]
    fn load_yaml_file() {
        let file = temp_config(".yaml", "scheduler:\n  strategy: immediate\n");
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.scheduler.strategy, Strategy::Immediate);
    }

    #[test]
    fn load_toml_file() {
        let file = temp_config(
            ".toml",
            r#"
drain_budget = 10

[scheduler]
strategy = "concurrent"
workers = 2

[pipeline]
source = { kind = "just", value = "x" }

[[pipeline.operators]]
op = "buffer"
capacity = 4
"#,
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.scheduler.kind(), SchedulerKind::Concurrent { workers: 2 });
        assert_eq!(cfg.get_drain_budget(), 10);
        let pipeline = cfg.pipeline.unwrap();
        assert_eq!(
            pipeline.operators,
            vec![OperatorSpec::Buffer {
                capacity: Some(4),
                overflow: None
            }]
        );
    }

    #[test]
    fn load_reports_missing_file_and_bad_syntax() {
        let missing = load_config("/nonexistent/flowbridge.yaml").unwrap_err();
        assert!(matches!(missing, FlowError::Config(ref msg) if msg.contains("cannot read")));

        let file = temp_config(".yaml", "scheduler: [not, a, map]");
        let invalid = load_config(file.path()).unwrap_err();
        assert!(matches!(invalid, FlowError::Config(ref msg) if msg.contains("invalid YAML")));
    }

    #[test]
    fn load_and_validate_rejects_invalid_values() {
        let file = temp_config(
            ".yaml",
            "buffer:\n  capacity: 0\ndrain_budget: 0\n",
        );
        let err = load_and_validate_config(file.path()).unwrap_err().to_string();
        assert!(err.contains("Capacity at 'buffer'"));
        assert!(err.contains("Drain budget"));
    }
}
