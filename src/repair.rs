//! Repair of near-JSON produced by the upstream model.
//!
//! Tool arguments frequently arrive with trailing commas, bare keys, or
//! wrapped in an extra layer of string quoting. Everything here is
//! best-effort: failures yield `None` or an empty string, never an error.

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::json_scan::is_complete_json;

static TRAILING_COMMA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").ok());

static BARE_KEY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([{,]\s*)([A-Za-z0-9_]+)\s*:").ok());

/// Unquote passes attempted by [`decode_tool_arguments`].
const MAX_DECODE_PASSES: usize = 3;

/// Strip trailing commas and quote bare keys. `Some` only when the result parses.
#[must_use]
pub fn sanitize_json(candidate: &str) -> Option<String> {
    let (Some(trailing_comma), Some(bare_key)) = (TRAILING_COMMA.as_ref(), BARE_KEY.as_ref())
    else {
        return is_complete_json(candidate.as_bytes()).then(|| candidate.to_string());
    };
    let without_commas = trailing_comma.replace_all(candidate, "${1}");
    let quoted = bare_key.replace_all(&without_commas, "${1}\"${2}\":");
    if is_complete_json(quoted.as_bytes()) {
        tracing::trace!(original = candidate, repaired = %quoted, "repaired malformed json");
        Some(quoted.into_owned())
    } else {
        None
    }
}

/// Canonicalize a tool-argument string.
///
/// Valid JSON passes through trimmed, repairable input is repaired, and
/// anything else becomes empty.
#[must_use]
pub fn normalize_arguments(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if is_complete_json(trimmed.as_bytes()) {
        return trimmed.to_string();
    }
    sanitize_json(trimmed).unwrap_or_default()
}

/// Decode tool arguments into a JSON object.
///
/// Empty input and `null` decode to an empty object. Otherwise up to three
/// passes of parse, repair-then-parse, and unquote-a-string-literal are tried.
#[must_use]
pub fn decode_tool_arguments(raw: &str) -> Option<Map<String, Value>> {
    let mut current = raw.trim().to_string();
    if current.is_empty() || current == "null" {
        return Some(Map::new());
    }

    for _ in 0..MAX_DECODE_PASSES {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&current) {
            return Some(map);
        }
        if let Some(repaired) = sanitize_json(&current) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&repaired) {
                return Some(map);
            }
        }
        match serde_json::from_str::<String>(&current) {
            Ok(inner) => current = inner.trim().to_string(),
            Err(_) => return None,
        }
    }
    None
}

/// Decoded arguments, or `{"value": raw}` when they cannot be decoded.
#[must_use]
pub fn decode_or_wrap(raw: &str) -> Value {
    match decode_tool_arguments(raw) {
        Some(map) => Value::Object(map),
        None => serde_json::json!({ "value": raw }),
    }
}

/// Merge two argument objects key-wise; keys from `incoming` win.
///
/// If either side is not an object the other side is returned unchanged.
#[must_use]
pub fn merge_json_arguments(existing: &str, incoming: &str) -> String {
    let existing = existing.trim();
    let incoming = incoming.trim();
    if existing.is_empty() {
        return incoming.to_string();
    }
    if incoming.is_empty() {
        return existing.to_string();
    }

    let Ok(Value::Object(mut base)) = serde_json::from_str::<Value>(existing) else {
        return incoming.to_string();
    };
    let Ok(Value::Object(update)) = serde_json::from_str::<Value>(incoming) else {
        return existing.to_string();
    };
    base.extend(update);
    serde_json::to_string(&base).unwrap_or_else(|_| existing.to_string())
}
