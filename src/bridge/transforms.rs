// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::bridge::spec::{PredicateSpec, TransformSpec};
use crate::bridge::Payload;
use crate::engine::{FilterFn, MapFn};

/// Builds payload transforms and predicates from their named specs.
///
/// Transforms treat the payload as UTF-8 text; invalid sequences are replaced
/// before transforming, so a transform never fails. `reverse` reverses
/// characters, not bytes.
pub struct NamedOperatorFactory;

impl NamedOperatorFactory {
    pub fn transform(spec: &TransformSpec) -> MapFn<Payload> {
        match spec.clone() {
            TransformSpec::Uppercase => text_map(|s| s.to_uppercase()),
            TransformSpec::Lowercase => text_map(|s| s.to_lowercase()),
            TransformSpec::Reverse => text_map(|s| s.chars().rev().collect()),
            TransformSpec::Trim => text_map(|s| s.trim().to_string()),
            TransformSpec::Prefix { value } => Arc::new(move |payload: Payload| {
                let mut out = Vec::with_capacity(value.len() + payload.len());
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(&payload);
                out
            }),
            TransformSpec::Suffix { value } => Arc::new(move |mut payload: Payload| {
                payload.extend_from_slice(value.as_bytes());
                payload
            }),
        }
    }

    pub fn predicate(spec: &PredicateSpec) -> FilterFn<Payload> {
        match spec.clone() {
            PredicateSpec::NonEmpty => Arc::new(|payload: &Payload| !payload.is_empty()),
            PredicateSpec::Utf8 => Arc::new(|payload: &Payload| std::str::from_utf8(payload).is_ok()),
            PredicateSpec::Json => Arc::new(|payload: &Payload| {
                serde_json::from_slice::<serde_json::Value>(payload).is_ok()
            }),
            PredicateSpec::Contains { value } => Arc::new(move |payload: &Payload| {
                let needle = value.as_bytes();
                needle.is_empty() || payload.windows(needle.len()).any(|w| w == needle)
            }),
            PredicateSpec::MaxLen { value } => Arc::new(move |payload: &Payload| payload.len() <= value),
        }
    }

    /// Names accepted in `{"name": ...}` transform specs.
    pub fn list_transforms() -> Vec<&'static str> {
        vec!["uppercase", "lowercase", "reverse", "trim", "prefix", "suffix"]
    }

    /// Names accepted in `{"name": ...}` predicate specs.
    pub fn list_predicates() -> Vec<&'static str> {
        vec!["non_empty", "utf8", "json", "contains", "max_len"]
    }
}

fn text_map(f: fn(&str) -> String) -> MapFn<Payload> {
    Arc::new(move |payload: Payload| f(&String::from_utf8_lossy(&payload)).into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(spec: TransformSpec, input: &str) -> String {
        let f = NamedOperatorFactory::transform(&spec);
        String::from_utf8(f(input.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn text_transforms() {
        let cases = vec![
            (TransformSpec::Uppercase, "hello", "HELLO"),
            (TransformSpec::Lowercase, "HeLLo", "hello"),
            (TransformSpec::Reverse, "héllo", "olléh"),
            (TransformSpec::Trim, "  padded \n", "padded"),
            (TransformSpec::Prefix { value: "[".into() }, "x", "[x"),
            (TransformSpec::Suffix { value: "]".into() }, "x", "x]"),
        ];
        for (spec, input, expected) in cases {
            assert_eq!(apply(spec.clone(), input), expected, "failed for {:?}", spec);
        }
    }

    #[test]
    fn predicates() {
        let check = |spec: PredicateSpec, input: &[u8]| NamedOperatorFactory::predicate(&spec)(&input.to_vec());

        assert!(check(PredicateSpec::NonEmpty, b"x"));
        assert!(!check(PredicateSpec::NonEmpty, b""));
        assert!(check(PredicateSpec::Utf8, "ü".as_bytes()));
        assert!(!check(PredicateSpec::Utf8, &[0xff, 0xfe]));
        assert!(check(PredicateSpec::Json, br#"{"a": 1}"#));
        assert!(!check(PredicateSpec::Json, b"{nope"));
        assert!(check(PredicateSpec::Contains { value: "ell".into() }, b"hello"));
        assert!(!check(PredicateSpec::Contains { value: "xyz".into() }, b"hello"));
        assert!(check(PredicateSpec::MaxLen { value: 3 }, b"abc"));
        assert!(!check(PredicateSpec::MaxLen { value: 3 }, b"abcd"));
    }

    #[test]
    fn listed_names_parse() {
        for name in NamedOperatorFactory::list_predicates() {
            let json = match name {
                "contains" => format!(r#"{{"name": "{}", "value": "a"}}"#, name),
                "max_len" => format!(r#"{{"name": "{}", "value": 1}}"#, name),
                _ => format!(r#"{{"name": "{}"}}"#, name),
            };
            assert!(serde_json::from_str::<PredicateSpec>(&json).is_ok(), "{}", name);
        }
        for name in NamedOperatorFactory::list_transforms() {
            let json = match name {
                "prefix" | "suffix" => format!(r#"{{"name": "{}", "value": "a"}}"#, name),
                _ => format!(r#"{{"name": "{}"}}"#, name),
            };
            assert!(serde_json::from_str::<TransformSpec>(&json).is_ok(), "{}", name);
        }
    }
}
