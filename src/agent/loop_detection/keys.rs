//! Stable identities for tool calls and their outcomes.
//!
//! Arguments and results are reduced to a canonical JSON text (object keys
//! sorted, array order kept) and hashed with SHA-256, so two structurally
//! equal values always produce the same key no matter how they were built.

use super::types::ToolOutcome;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a tool call: tool name plus canonical arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey(String);

impl CallKey {
    /// Derive the key for a tool invocation.
    #[must_use]
    pub fn new(tool_name: &str, args: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tool_name.as_bytes());
        hasher.update(b":");
        hasher.update(canonical_json(args).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex digest backing this key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of what a tool call produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutcomeKey(String);

impl OutcomeKey {
    /// Key for a failed call: tag plus the error message.
    #[must_use]
    pub fn from_error(message: &str) -> Self {
        Self(format!("error:{message}"))
    }

    /// Key for a successful call.
    ///
    /// Results carrying text blocks are keyed on their text alone so that
    /// metadata next to the blocks does not affect equality.
    #[must_use]
    pub fn from_result(result: &Value) -> Self {
        match extract_text(result) {
            Some(text) => Self(format!("text:{}", digest(&text))),
            None => Self(format!("value:{}", digest(&canonical_json(result)))),
        }
    }

    /// Key for an outcome, `None` while the call is still pending.
    #[must_use]
    pub fn from_outcome(outcome: &ToolOutcome) -> Option<Self> {
        match outcome {
            ToolOutcome::Pending => None,
            ToolOutcome::Success(value) => Some(Self::from_result(value)),
            ToolOutcome::Failure(message) => Some(Self::from_error(message)),
        }
    }

    /// Raw key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Serialize a value with sorted object keys and preserved array order.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Concatenated, trimmed text of a result's text blocks.
///
/// Accepts either `{"content": [blocks]}` or a bare array of blocks.
fn extract_text(result: &Value) -> Option<String> {
    let blocks = match result {
        Value::Object(map) => map.get("content")?.as_array()?,
        Value::Array(items) => items,
        _ => return None,
    };

    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        return None;
    }

    Some(texts.join("\n").trim().to_string())
}

fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{canonical_json, CallKey, OutcomeKey};
    use crate::agent::loop_detection::ToolOutcome;
    use serde_json::json;

    #[test]
    fn object_key_order_does_not_matter() {
        let a = json!({"path": "a.txt", "opts": {"x": 1, "y": [1, 2]}});
        let b = json!({"opts": {"y": [1, 2], "x": 1}, "path": "a.txt"});
        assert_eq!(CallKey::new("read", &a), CallKey::new("read", &b));
    }

    #[test]
    fn array_order_matters() {
        let a = json!({"ids": [1, 2]});
        let b = json!({"ids": [2, 1]});
        assert_ne!(CallKey::new("fetch", &a), CallKey::new("fetch", &b));
    }

    #[test]
    fn tool_name_is_part_of_the_key() {
        let args = json!({"q": "rust"});
        assert_ne!(CallKey::new("search", &args), CallKey::new("fetch", &args));
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let value = json!({"b": {"d": null, "c": true}, "a": "x\"y"});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":"x\"y","b":{"c":true,"d":null}}"#
        );
    }

    #[test]
    fn string_and_number_scalars_differ() {
        assert_ne!(
            CallKey::new("t", &json!({"n": 1})),
            CallKey::new("t", &json!({"n": "1"}))
        );
    }

    #[test]
    fn text_blocks_ignore_metadata() {
        let a = json!({"content": [{"type": "text", "text": " hello "}], "details": {"ms": 12}});
        let b = json!({"content": [{"type": "text", "text": "hello"}], "details": {"ms": 40}});
        assert_eq!(OutcomeKey::from_result(&a), OutcomeKey::from_result(&b));
    }

    #[test]
    fn bare_block_arrays_match_content_wrappers() {
        let bare = json!([{"type": "text", "text": "hi"}]);
        let wrapped = json!({"content": [{"type": "text", "text": "hi"}]});
        let key = OutcomeKey::from_result(&bare);
        assert_eq!(key, OutcomeKey::from_result(&wrapped));
        assert!(key.as_str().starts_with("text:"));
    }

    #[test]
    fn results_without_text_use_full_value() {
        let a = json!({"status": 200, "ms": 12});
        let b = json!({"status": 200, "ms": 40});
        assert_ne!(OutcomeKey::from_result(&a), OutcomeKey::from_result(&b));
    }

    #[test]
    fn errors_are_keyed_by_message() {
        assert_eq!(OutcomeKey::from_error("ENOENT").as_str(), "error:ENOENT");
        assert_ne!(
            OutcomeKey::from_error("ENOENT"),
            OutcomeKey::from_result(&json!("ENOENT"))
        );
    }

    #[test]
    fn pending_outcome_has_no_key() {
        assert!(OutcomeKey::from_outcome(&ToolOutcome::Pending).is_none());
    }
}
