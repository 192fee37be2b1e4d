//! Content normalization shared by the one-shot and streaming paths.
//!
//! Upstream content shows up as a string, an array of blocks, a structured
//! object with `text`/`content`, or a bare scalar. Each node is classified
//! once into [`ContentNode`] and then walked.

use serde_json::Value;
use std::borrow::Cow;

use crate::protocol::canonical::ToolCall;
use crate::repair::normalize_arguments;

/// Placeholder text the upstream emits while it is reasoning.
const THINKING_SENTINEL: &str = "Thinking";
const SYSTEM_REMINDER_LINE: &str = "<system-reminder>";

/// One classified content node.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode<'a> {
    Absent,
    Text(&'a str),
    Blocks(&'a [Value]),
    Structured {
        text: Option<&'a Value>,
        content: Option<&'a Value>,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: Option<&'a Value>,
    },
    Scalar(String),
}

impl<'a> ContentNode<'a> {
    #[must_use]
    pub fn classify(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => ContentNode::Absent,
            Some(Value::String(text)) => ContentNode::Text(text),
            Some(Value::Array(blocks)) => ContentNode::Blocks(blocks),
            Some(Value::Object(map)) => {
                if map.get("type").and_then(Value::as_str) == Some("tool_use") {
                    ContentNode::ToolUse {
                        id: first_str(map.get("id"), map.get("toolUseId")),
                        name: map.get("name").and_then(Value::as_str).unwrap_or_default(),
                        input: map.get("input"),
                    }
                } else {
                    ContentNode::Structured {
                        text: map.get("text"),
                        content: map.get("content"),
                    }
                }
            }
            Some(scalar @ (Value::Bool(_) | Value::Number(_))) => {
                ContentNode::Scalar(scalar.to_string())
            }
        }
    }
}

fn first_str<'a>(primary: Option<&'a Value>, fallback: Option<&'a Value>) -> &'a str {
    primary
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .or_else(|| fallback.and_then(Value::as_str))
        .unwrap_or_default()
}

/// Collect the visible text under `value`, depth-first in document order.
#[must_use]
pub fn collect_text(value: Option<&Value>) -> String {
    let mut out = String::new();
    append_text(&mut out, value);
    out
}

/// Append the visible text under `value` to `out`.
pub fn append_text(out: &mut String, value: Option<&Value>) {
    match ContentNode::classify(value) {
        ContentNode::Absent | ContentNode::ToolUse { .. } => {}
        ContentNode::Text(text) => push_text_piece(out, text),
        ContentNode::Scalar(text) => push_text_piece(out, &text),
        ContentNode::Blocks(blocks) => {
            for block in blocks {
                append_text(out, Some(block));
            }
        }
        ContentNode::Structured { text, content } => {
            append_text(out, text);
            append_text(out, content);
        }
    }
}

/// Apply the text policy to one piece and append what survives.
pub fn push_text_piece(out: &mut String, piece: &str) {
    if let Some(normalized) = normalize_text_piece(piece) {
        out.push_str(&normalized);
    }
}

/// `None` when the piece is filtered out entirely.
///
/// The reasoning sentinel is dropped, literal `\n` escapes become newlines,
/// and `<system-reminder>` marker lines are removed.
#[must_use]
pub fn normalize_text_piece(piece: &str) -> Option<Cow<'_, str>> {
    if piece.is_empty() || piece == THINKING_SENTINEL {
        return None;
    }
    let mut text = Cow::Borrowed(piece);
    if text.contains("\\n") {
        text = Cow::Owned(text.replace("\\n", "\n"));
    }
    if contains_ignore_ascii_case(&text, SYSTEM_REMINDER_LINE) {
        let kept: Vec<&str> = text
            .split('\n')
            .filter(|line| !line.trim().eq_ignore_ascii_case(SYSTEM_REMINDER_LINE))
            .collect();
        text = Cow::Owned(kept.join("\n"));
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Raw argument text for a tool `input` value.
///
/// Absent, `null`, `{}` and blank strings carry no arguments. A string input
/// is taken as already-serialized JSON.
#[must_use]
pub fn raw_input_arguments(input: Option<&Value>) -> Option<String> {
    let raw = match input? {
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        Value::Object(map) if map.is_empty() => return None,
        other => other.to_string(),
    };
    if raw.is_empty() || raw == "null" || raw == "{}" {
        None
    } else {
        Some(raw)
    }
}

/// Collect every `tool_use` block under `value`.
#[must_use]
pub fn extract_tool_uses(value: Option<&Value>) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    collect_tool_uses(&mut calls, value);
    calls
}

fn collect_tool_uses(calls: &mut Vec<ToolCall>, value: Option<&Value>) {
    match ContentNode::classify(value) {
        ContentNode::ToolUse { id, name, input } => {
            let arguments = raw_input_arguments(input)
                .map(|raw| normalize_arguments(&raw))
                .unwrap_or_default();
            calls.push(ToolCall::new(id, name, arguments));
        }
        ContentNode::Blocks(blocks) => {
            for block in blocks {
                collect_tool_uses(calls, Some(block));
            }
        }
        ContentNode::Structured { content, .. } => collect_tool_uses(calls, content),
        ContentNode::Absent | ContentNode::Text(_) | ContentNode::Scalar(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_shape_once() {
        let blocks = json!([{"type": "text", "text": "a"}]);
        assert!(matches!(ContentNode::classify(Some(&blocks)), ContentNode::Blocks(b) if b.len() == 1));
        assert_eq!(ContentNode::classify(Some(&json!("hi"))), ContentNode::Text("hi"));
        assert_eq!(ContentNode::classify(Some(&json!(null))), ContentNode::Absent);
        assert_eq!(ContentNode::classify(Some(&json!(3))), ContentNode::Scalar("3".to_string()));
        let tool = json!({"type": "tool_use", "toolUseId": "t1", "name": "f"});
        assert!(matches!(
            ContentNode::classify(Some(&tool)),
            ContentNode::ToolUse { id: "t1", name: "f", input: None }
        ));
    }

    #[test]
    fn collects_text_depth_first() {
        let value = json!([
            {"type": "text", "text": "Hello "},
            {"content": [{"text": "nested"}, " and "]},
            {"type": "tool_use", "id": "t", "name": "n", "input": {"text": "hidden"}},
            {"text": "end", "content": "!"},
            42
        ]);
        assert_eq!(collect_text(Some(&value)), "Hello nested and end!42");
    }

    #[test]
    fn applies_text_policy() {
        let value = json!(["Thinking", "line one\\nline two", "\n<System-Reminder>\nkept"]);
        assert_eq!(collect_text(Some(&value)), "line one\nline two\nkept");
        assert_eq!(normalize_text_piece("Thinking about it").as_deref(), Some("Thinking about it"));
    }

    #[test]
    fn extracts_tool_use_blocks_with_fallback_ids() {
        let value = json!([
            {"type": "text", "text": "calling"},
            {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": "x"}},
            {"content": [{"type": "tool_use", "toolUseId": "toolu_2", "name": "noop", "input": {}}]},
            {"type": "tool_use", "id": "toolu_3", "name": "fix", "input": "{a: 1,}"}
        ]);
        let calls = extract_tool_uses(Some(&value));
        assert_eq!(
            calls,
            vec![
                ToolCall::new("toolu_1", "lookup", r#"{"q":"x"}"#),
                ToolCall::new("toolu_2", "noop", ""),
                ToolCall::new("toolu_3", "fix", r#"{"a": 1}"#),
            ]
        );
    }

    #[test]
    fn raw_input_skips_empty_shapes() {
        assert_eq!(raw_input_arguments(None), None);
        assert_eq!(raw_input_arguments(Some(&json!(null))), None);
        assert_eq!(raw_input_arguments(Some(&json!({}))), None);
        assert_eq!(raw_input_arguments(Some(&json!("  {}  "))), None);
        assert_eq!(
            raw_input_arguments(Some(&json!({"a": [1]}))).as_deref(),
            Some(r#"{"a":[1]}"#)
        );
    }
}
