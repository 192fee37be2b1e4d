//! Whole-document (non-streaming) upstream responses.

use serde_json::{json, Value};

use crate::accumulator::dedup_tool_calls;
use crate::content::{collect_text, extract_tool_uses};
use crate::json_scan::is_complete_json;
use crate::protocol::canonical::{NormalizedResponse, ToolCall};
use crate::sanitize::{sanitize_assistant_text, SanitizeOptions};
use crate::stream::{decode_text, FrameData};
use crate::stream::eventstream::normalize_payload;

use super::{drive, ProcessingContext};

const CURRENT_CONTENT: &[&str] = &[
    "conversationState",
    "currentMessage",
    "assistantResponseMessage",
    "content",
];
const TOOL_USE_PATHS: &[&[&str]] = &[
    &["conversationState", "currentMessage", "toolUse"],
    &["conversationState", "currentMessage", "assistantResponseMessage", "toolUse"],
];
const FALLBACK_PATHS: &[&[&str]] = &[&["content"], &["message", "content"], &["message"]];

/// Parse a complete upstream body, one-shot or streamed.
///
/// A body holding exactly one JSON document is read as a one-shot response;
/// anything else is decoded into frames and interpreted. A body that decodes
/// to no structured frame and no text falls back to [`recover_plain_text`].
#[must_use]
pub fn parse_response(raw: &[u8]) -> NormalizedResponse {
    let normalized = normalize_payload(raw);
    let body = String::from_utf8_lossy(&normalized);
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return NormalizedResponse::default();
    }
    if is_complete_json(trimmed.as_bytes()) {
        if let Ok(document) = serde_json::from_str::<Value>(trimmed) {
            return parse_document(&document);
        }
    }

    let frames = decode_text(&body);
    tracing::debug!(frames = frames.len(), "interpreting upstream stream");
    let structured = frames
        .iter()
        .any(|frame| matches!(frame.data, FrameData::Json(_)));
    let mut ctx = ProcessingContext::new();
    drive(&frames, &mut ctx);
    let mut resp = ctx.finish();

    if !structured && resp.text.is_empty() && resp.tool_calls.is_empty() {
        let recovered = recover_plain_text(trimmed);
        tracing::debug!(recovered_len = recovered.len(), "recovered text from malformed body");
        resp.text = sanitize_assistant_text(&recovered, SanitizeOptions::ASSISTANT_TEXT);
    }
    resp
}

/// Best-effort text from a body nothing else could read.
///
/// Plain text is returned trimmed. JSON-looking input is split on structural
/// characters and the longest piece, unquoted, wins.
#[must_use]
pub fn recover_plain_text(body: &str) -> String {
    let body = body.trim();
    if !body.contains('{') && !body.contains("data:") {
        return body.to_string();
    }
    let inner = body
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .map_or(body, str::trim);

    let best = inner
        .split([':', ',', '[', ']', '{', '}'])
        .map(|part| part.trim().trim_matches('"').trim())
        .filter(|part| part.len() > 1)
        .fold("", |best, part| if part.len() > best.len() { part } else { best });
    if best.is_empty() {
        inner.to_string()
    } else {
        best.to_string()
    }
}

/// Whether [`parse_response`] would read `raw` as a single document.
#[must_use]
pub fn is_one_shot_body(raw: &[u8]) -> bool {
    let normalized = normalize_payload(raw);
    let body = String::from_utf8_lossy(&normalized);
    let trimmed = body.trim();
    !trimmed.is_empty()
        && is_complete_json(trimmed.as_bytes())
        && serde_json::from_str::<serde::de::IgnoredAny>(trimmed).is_ok()
}

/// Extract text and tool calls from a one-shot response document.
#[must_use]
pub fn parse_document(document: &Value) -> NormalizedResponse {
    let mut text = conversation_text(document).unwrap_or_default();
    if text.trim().is_empty() {
        text = FALLBACK_PATHS
            .iter()
            .map(|path| collect_text(lookup(document, path)))
            .find(|candidate| !candidate.trim().is_empty())
            .unwrap_or_default();
    }

    let mut tool_calls = conversation_tool_uses(document);
    for path in FALLBACK_PATHS {
        tool_calls.extend(extract_tool_uses(lookup(document, path)));
    }

    NormalizedResponse::new(
        sanitize_assistant_text(&text, SanitizeOptions::ASSISTANT_TEXT),
        dedup_tool_calls(tool_calls),
    )
}

/// Current-turn content, else the newest assistant turn in the history.
fn conversation_text(document: &Value) -> Option<String> {
    let content = lookup(document, CURRENT_CONTENT).or_else(|| {
        lookup(document, &["conversationState", "history"])
            .and_then(Value::as_array)?
            .iter()
            .rev()
            .find_map(|turn| lookup(turn, &["assistantResponseMessage", "content"]))
    })?;
    Some(match content {
        Value::String(text) => text.clone(),
        other => collect_text(Some(other)),
    })
}

fn conversation_tool_uses(document: &Value) -> Vec<ToolCall> {
    let Some(tool_use) = TOOL_USE_PATHS.iter().find_map(|path| lookup(document, path)) else {
        return Vec::new();
    };
    let entries = match tool_use {
        Value::Array(entries) => entries.as_slice(),
        single => std::slice::from_ref(single),
    };
    entries.iter().filter_map(conversation_tool_call).collect()
}

fn conversation_tool_call(entry: &Value) -> Option<ToolCall> {
    let id = entry.get("toolUseId").and_then(Value::as_str).filter(|s| !s.is_empty())?;
    let name = entry.get("name").and_then(Value::as_str).filter(|s| !s.is_empty())?;
    let arguments = match entry.get("input") {
        None => String::new(),
        Some(input @ Value::Object(_)) => input.to_string(),
        Some(Value::String(raw)) => json!({ "value": raw }).to_string(),
        Some(other) => json!({ "value": other.to_string() }).to_string(),
    };
    Some(ToolCall::new(id, name, arguments))
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |node, key| node.get(*key))
        .filter(|node| !node.is_null())
}
