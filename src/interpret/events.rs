//! Decoding of upstream frames into typed events.
//!
//! Every frame is classified exactly once here; the parse path and the
//! incremental Anthropic stream builder both consume the same events.

use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::borrow::Cow;

use crate::content::{
    append_text, collect_text, normalize_text_piece, push_text_piece, raw_input_arguments,
};
use crate::stream::{FrameData, StreamFrame};

/// Events decoded from one frame. Almost every frame yields one or two.
pub type FrameEvents<'a> = SmallVec<[UpstreamEvent<'a>; 2]>;

/// Argument payload carried by a legacy (name-keyed) tool frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyInput<'a> {
    None,
    /// A complete JSON value, merged key-by-key into the call.
    Object(String),
    /// A streamed argument fragment.
    Fragment(&'a str),
}

/// A normalized upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent<'a> {
    /// Assistant text with the text policy already applied.
    Text(Cow<'a, str>),
    /// A `tool_use` content block opened at a stream index.
    ToolStart {
        id: &'a str,
        name: &'a str,
        index: Option<usize>,
        arguments: Option<String>,
    },
    /// An `input_json_delta` fragment for the block at `index`.
    ToolFragment { index: usize, fragment: &'a str },
    /// The content block at `index` closed.
    ToolStop { index: usize },
    /// A tool frame keyed by id and name instead of block index.
    LegacyTool {
        id: &'a str,
        name: &'a str,
        input: LegacyInput<'a>,
        stop: bool,
    },
    /// An explicit stop reason reported by the upstream.
    StopReason(&'a str),
    /// The upstream asked the client for a follow-up prompt.
    Followup,
}

/// Decode one frame into the events it carries.
#[must_use]
pub fn decode_frame(frame: &StreamFrame) -> FrameEvents<'_> {
    let mut events = FrameEvents::new();
    match &frame.data {
        FrameData::Text(text) => {
            if !text.is_empty() {
                events.push(UpstreamEvent::Text(Cow::Borrowed(text)));
            }
        }
        FrameData::Json(value) => decode_json(frame.event_type(), value, &mut events),
    }
    events
}

fn decode_json<'a>(event_type: &str, value: &'a Value, events: &mut FrameEvents<'a>) {
    let Some(obj) = value.as_object() else {
        push_text(events, Some(value));
        return;
    };
    if is_bookkeeping_payload(value) {
        return;
    }
    if let Some(reason) = stop_reason_hint(obj) {
        events.push(UpstreamEvent::StopReason(reason));
    }
    if is_followup(obj) {
        events.push(UpstreamEvent::Followup);
        return;
    }

    match event_type {
        "content_block_start" => {
            if let Some(block) = obj.get("content_block").filter(|b| b.is_object()) {
                decode_block_start(obj, block, events);
                return;
            }
        }
        "content_block_delta" => {
            if let Some(delta) = obj.get("delta").and_then(Value::as_object) {
                decode_block_delta(obj, delta, events);
                return;
            }
        }
        "content_block_stop" => {
            if let Some(index) = block_index(obj) {
                events.push(UpstreamEvent::ToolStop { index });
                return;
            }
        }
        "message_start" => {
            if obj.contains_key("message") {
                push_text(events, obj.get("message"));
                return;
            }
        }
        "message_delta" => {
            if obj.contains_key("delta") {
                push_text(events, obj.get("delta"));
                return;
            }
        }
        "message_stop" => return,
        "message" => {
            push_text(events, obj.get("content"));
            push_text(events, obj.get("message"));
            return;
        }
        _ => {}
    }
    decode_generic(obj, events);
}

fn decode_block_start<'a>(obj: &'a Map<String, Value>, block: &'a Value, events: &mut FrameEvents<'a>) {
    if block.get("type").and_then(Value::as_str) != Some("tool_use") {
        push_text(events, Some(block));
        return;
    }
    events.push(UpstreamEvent::ToolStart {
        id: first_str(block, &["id", "toolUseId"]),
        name: block.get("name").and_then(Value::as_str).unwrap_or_default(),
        index: block_index(obj),
        arguments: raw_input_arguments(block.get("input")),
    });
}

fn decode_block_delta<'a>(
    obj: &'a Map<String, Value>,
    delta: &'a Map<String, Value>,
    events: &mut FrameEvents<'a>,
) {
    let partial_json = delta.get("partial_json").and_then(Value::as_str);
    match delta.get("type").and_then(Value::as_str) {
        Some("text_delta") => {
            if let Some(text) = delta.get("text").and_then(Value::as_str) {
                if let Some(text) = normalize_text_piece(text) {
                    events.push(UpstreamEvent::Text(text));
                }
            }
        }
        Some("input_json_delta") => {
            if let (Some(index), Some(fragment)) = (block_index(obj), partial_json) {
                events.push(UpstreamEvent::ToolFragment { index, fragment });
            }
        }
        _ => {
            let mut text = collect_text(delta.get("text"));
            append_text(&mut text, delta.get("content"));
            if let Some(partial) = partial_json {
                push_text_piece(&mut text, partial);
            }
            if !text.is_empty() {
                events.push(UpstreamEvent::Text(Cow::Owned(text)));
            }
        }
    }
}

fn decode_generic<'a>(obj: &'a Map<String, Value>, events: &mut FrameEvents<'a>) {
    if let Some(name) = obj.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
        let input = match obj.get("input") {
            Some(Value::String(fragment)) => LegacyInput::Fragment(fragment),
            Some(value @ (Value::Object(_) | Value::Array(_))) => {
                LegacyInput::Object(value.to_string())
            }
            _ => match obj.get("partial_json").and_then(Value::as_str) {
                Some(fragment) => LegacyInput::Fragment(fragment),
                None => LegacyInput::None,
            },
        };
        let id = obj
            .get("toolUseId")
            .or_else(|| obj.get("tool_use_id"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        events.push(UpstreamEvent::LegacyTool {
            id,
            name,
            input,
            stop: obj.get("stop").and_then(Value::as_bool).unwrap_or(false),
        });
        return;
    }

    push_text(events, obj.get("content"));
    push_text(events, obj.get("delta"));
    push_text(events, obj.get("message"));
}

fn push_text<'a>(events: &mut FrameEvents<'a>, value: Option<&'a Value>) {
    let text = collect_text(value);
    if !text.is_empty() {
        events.push(UpstreamEvent::Text(Cow::Owned(text)));
    }
}

fn block_index(obj: &Map<String, Value>) -> Option<usize> {
    obj.get("index")
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn stop_reason_hint(obj: &Map<String, Value>) -> Option<&str> {
    let delta = obj.get("delta");
    obj.get("stop_reason")
        .or_else(|| delta.and_then(|d| d.get("stop_reason")))
        .or_else(|| delta.and_then(|d| d.get("stopReason")))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
}

fn is_followup(obj: &Map<String, Value>) -> bool {
    obj.get("followupPrompt").and_then(Value::as_bool) == Some(true)
}

// ---------------------------------------------------------------------------
// Bookkeeping payloads
// ---------------------------------------------------------------------------

const METERING_KEYS: [&str; 3] = ["unit", "unitPlural", "usage"];

/// A billing meter event: exactly `unit`, `unitPlural` and `usage`.
#[must_use]
pub fn is_metering_payload(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.len() == METERING_KEYS.len() && METERING_KEYS.iter().all(|key| obj.contains_key(*key))
    })
}

/// A context-window gauge: an object whose only key is `contextUsagePercentage`.
#[must_use]
pub fn is_context_usage_payload(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.contains_key("contextUsagePercentage"))
}

/// Frames that carry no assistant output and are consumed silently.
#[must_use]
pub fn is_bookkeeping_payload(value: &Value) -> bool {
    is_metering_payload(value) || is_context_usage_payload(value)
}
