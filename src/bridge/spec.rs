// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Serializable source and operator descriptions.
//!
//! These are the parameter shapes accepted across the boundary (as JSON) and
//! in configuration files (as YAML or TOML).
//!
//! ```json
//! {"kind": "sequence", "values": ["a", "b"]}
//! [{"op": "filter", "predicate": {"name": "non_empty"}},
//!  {"op": "map", "transform": {"name": "prefix", "value": "> "}},
//!  {"op": "buffer", "capacity": 32, "overflow": "drop_newest"}]
//! ```

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::bridge::Payload;
use crate::engine::OverflowPolicy;
use crate::errors::{FlowError, FlowResult};

/// How string values in parameters become payload bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueEncoding {
    #[default]
    Utf8,
    Base64,
}

impl ValueEncoding {
    pub fn decode(&self, value: &str) -> FlowResult<Payload> {
        match self {
            ValueEncoding::Utf8 => Ok(value.as_bytes().to_vec()),
            ValueEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(value)
                .map_err(|e| FlowError::InvalidArgument(format!("invalid base64 value: {}", e))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Just {
        value: String,
        #[serde(default)]
        encoding: ValueEncoding,
    },
    Sequence {
        values: Vec<String>,
        #[serde(default)]
        encoding: ValueEncoding,
    },
    Empty,
    /// Values pushed through `emit` on the publisher handle.
    External {
        #[serde(default)]
        queue_capacity: Option<usize>,
        #[serde(default)]
        overflow: Option<OverflowPolicy>,
    },
    /// A named signal from the hub.
    Signal { name: String },
}

impl SourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSpec::Just { .. } => "just",
            SourceSpec::Sequence { .. } => "sequence",
            SourceSpec::Empty => "empty",
            SourceSpec::External { .. } => "external",
            SourceSpec::Signal { .. } => "signal",
        }
    }

    /// Parses a spec from a kind name plus a JSON object of parameters.
    /// Empty parameters (`""` or `null`) are accepted for parameterless kinds.
    pub fn from_kind_and_params(kind: &str, params: &str) -> FlowResult<Self> {
        let mut object = match params.trim() {
            "" | "null" => serde_json::Map::new(),
            text => match serde_json::from_str::<serde_json::Value>(text)? {
                serde_json::Value::Object(object) => object,
                other => {
                    return Err(FlowError::InvalidArgument(format!(
                        "publisher parameters must be a JSON object, got {}",
                        other
                    )))
                }
            },
        };
        object.insert("kind".into(), serde_json::Value::String(kind.into()));
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum TransformSpec {
    Uppercase,
    Lowercase,
    Reverse,
    Trim,
    Prefix { value: String },
    Suffix { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum PredicateSpec {
    NonEmpty,
    Utf8,
    Json,
    Contains { value: String },
    MaxLen { value: usize },
}

/// A merge input: an existing publisher or pipeline handle, or an inline source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergeSource {
    Handle(u64),
    Inline(SourceSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperatorSpec {
    Map {
        transform: TransformSpec,
    },
    Filter {
        predicate: PredicateSpec,
    },
    /// Omitted fields take the configured buffer defaults.
    Buffer {
        #[serde(default)]
        capacity: Option<usize>,
        #[serde(default)]
        overflow: Option<OverflowPolicy>,
    },
    Merge {
        sources: Vec<MergeSource>,
    },
    Debounce {
        interval_ms: u64,
    },
}

impl OperatorSpec {
    pub fn name(&self) -> &'static str {
        match self {
            OperatorSpec::Map { .. } => "map",
            OperatorSpec::Filter { .. } => "filter",
            OperatorSpec::Buffer { .. } => "buffer",
            OperatorSpec::Merge { .. } => "merge",
            OperatorSpec::Debounce { .. } => "debounce",
        }
    }

    pub fn parse_list(json: &str) -> FlowResult<Vec<OperatorSpec>> {
        match json.trim() {
            "" | "null" => Ok(Vec::new()),
            text => Ok(serde_json::from_str(text)?),
        }
    }
}
