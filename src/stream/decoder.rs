//! Upstream body → ordered [`StreamFrame`]s.
//!
//! The upstream answers in several shapes: one JSON document, SSE frames,
//! newline-delimited JSON objects, prose with JSON embedded in it, or any
//! of those inside the binary event-stream envelope. All of them are
//! flattened here into one frame sequence.

use regex_lite::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

use super::eventstream::normalize_payload;
use super::sse::{is_done_event, split_sse_frames};
use super::{SseEvent, StreamFrame};
use crate::json_scan::{is_complete_json, json_object_spans};
use crate::repair::sanitize_json;
use crate::util::next_call_id;

/// `[Called <tool> with args: {...}]` announcements the model writes as prose.
static CALL_ANNOUNCEMENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?s)\[Called\s+([A-Za-z0-9_]+)\s+with\s+args:\s*(\{.*?\})\]").ok()
});

/// Decode a complete upstream body into frames, in arrival order.
#[must_use]
pub fn decode_frames(raw: &[u8]) -> Vec<StreamFrame> {
    let normalized = normalize_payload(raw);
    decode_text(&String::from_utf8_lossy(&normalized))
}

/// [`decode_frames`] for a body already stripped of any binary envelope.
#[must_use]
pub fn decode_text(body: &str) -> Vec<StreamFrame> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if is_complete_json(trimmed.as_bytes()) {
        return serde_json::from_str::<Value>(trimmed)
            .map(|value| vec![StreamFrame::json(None, value)])
            .unwrap_or_default();
    }

    let mut frames = Vec::new();
    for event in split_sse_frames(body) {
        decode_sse_event(&event, &mut frames);
    }
    frames.extend(announced_tool_calls(body));
    frames
}

fn decode_sse_event(event: &SseEvent, frames: &mut Vec<StreamFrame>) {
    let data = event.data.trim();
    if data.is_empty() || is_done_event(event) {
        return;
    }

    if is_complete_json(data.as_bytes()) {
        if let Ok(value) = serde_json::from_str::<Value>(data) {
            frames.push(StreamFrame::json(event.event.clone(), value));
            return;
        }
    }

    let mut prose: Vec<String> = Vec::new();
    for line in event.data.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let line = strip_announcements(line);
        if line.trim().is_empty() {
            continue;
        }

        let trimmed = line.trim();
        if is_complete_json(trimmed.as_bytes()) {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                flush_prose(&mut prose, frames);
                frames.push(frame_preferring_own_type(event, value));
                continue;
            }
        }

        // Prose around embedded objects stays in place between them.
        let mut cursor = 0;
        for span in json_object_spans(&line) {
            let Ok(value) = serde_json::from_str::<Value>(&line[span.clone()]) else {
                continue;
            };
            push_prose(&line[cursor..span.start], &mut prose);
            flush_prose(&mut prose, frames);
            frames.push(frame_preferring_own_type(event, value));
            cursor = span.end;
        }
        push_prose(&line[cursor..], &mut prose);
    }
    flush_prose(&mut prose, frames);
}

/// Queue a prose segment. Envelope debris and unrecoverable JSON are dropped.
fn push_prose(segment: &str, prose: &mut Vec<String>) {
    if segment.trim_matches(|c: char| c.is_whitespace() || c.is_control()).is_empty() {
        return;
    }
    if segment.contains('{') {
        tracing::debug!(segment, "dropping prose with unrecoverable json");
        return;
    }
    prose.push(segment.to_string());
}

fn frame_preferring_own_type(event: &SseEvent, value: Value) -> StreamFrame {
    if value.get("type").and_then(Value::as_str).is_some() {
        StreamFrame::json(None, value)
    } else {
        StreamFrame::json(event.event.clone(), value)
    }
}

fn flush_prose(prose: &mut Vec<String>, frames: &mut Vec<StreamFrame>) {
    if !prose.is_empty() {
        frames.push(StreamFrame::text(prose.join("\n")));
        prose.clear();
    }
}

fn strip_announcements(line: &str) -> String {
    match CALL_ANNOUNCEMENT.as_ref() {
        Some(pattern) => pattern.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

/// Synthetic legacy tool frames for every repairable call announcement.
fn announced_tool_calls(body: &str) -> Vec<StreamFrame> {
    let Some(pattern) = CALL_ANNOUNCEMENT.as_ref() else {
        return Vec::new();
    };
    let mut frames = Vec::new();
    for caps in pattern.captures_iter(body) {
        let (Some(name), Some(args)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let input = sanitize_json(args.as_str())
            .and_then(|repaired| serde_json::from_str::<Value>(&repaired).ok())
            .filter(Value::is_object);
        let Some(input) = input else {
            tracing::debug!(tool = name.as_str(), "skipping call announcement with unrepairable args");
            continue;
        };
        frames.push(StreamFrame::json(
            None,
            json!({
                "name": name.as_str(),
                "toolUseId": next_call_id(),
                "input": input,
                "stop": true,
            }),
        ));
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FrameData;

    fn json_payloads(frames: &[StreamFrame]) -> Vec<&Value> {
        frames
            .iter()
            .filter_map(|frame| match &frame.data {
                FrameData::Json(value) => Some(value),
                FrameData::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn blank_body_has_no_frames() {
        assert!(decode_frames(b"").is_empty());
        assert!(decode_frames(b" \n\t\n").is_empty());
    }

    #[test]
    fn single_document_is_one_frame() {
        let frames = decode_frames(br#" {"content":"hi","type":"message"} "#);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type(), "message");
    }

    #[test]
    fn sse_event_name_wins_for_whole_frames() {
        let body = "event: content_block_delta\ndata: {\"type\":\"other\",\"index\":0}\n\n";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type(), "content_block_delta");
    }

    #[test]
    fn legacy_lines_become_separate_frames() {
        let body = "data: {\"content\":\"Line 1\"}\ndata: {\"content\":\"Line 2\"}\n{\"name\":\"f\"}";
        let frames = decode_frames(body.as_bytes());
        let payloads = json_payloads(&frames);
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[1]["content"], "Line 2");
        assert_eq!(payloads[2]["name"], "f");
    }

    #[test]
    fn embedded_objects_prefer_their_own_type() {
        let body = "event: message\ndata: noise {\"type\":\"message_stop\"} and {\"content\":\"x\"} {\"broken\": }\n\n";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], StreamFrame::text("noise "));
        assert_eq!(frames[1].event_type(), "message_stop");
        assert_eq!(frames[2], StreamFrame::text(" and "));
        assert_eq!(frames[3].event_type(), "message");
    }

    #[test]
    fn control_debris_between_objects_is_not_prose() {
        let body = "data: \u{1}{\"content\":\"a\"}\u{7}\u{0}{\"content\":\"b\"}\n\n";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| matches!(f.data, FrameData::Json(_))));
    }

    #[test]
    fn announcement_with_valid_json_keeps_surrounding_prose() {
        let body = "I will search now. [Called search with args: {\"q\":1}]\nDone.";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(frames[0], StreamFrame::text("I will search now. \nDone."));
        let payloads = json_payloads(&frames);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["name"], "search");
        assert_eq!(payloads[0]["input"], json!({"q": 1}));
    }

    #[test]
    fn prose_lines_are_grouped_and_done_is_skipped() {
        let body = "data: Hello\ndata: world\n\ndata: [DONE]\n\n";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(frames, vec![StreamFrame::text("Hello\nworld")]);
    }

    #[test]
    fn unclosed_json_lines_are_dropped() {
        let body = "data: {\"content\":\"ok\"}\n\ndata: {\"content\": \"never closed\n\n";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(json_payloads(&frames).len(), 1);
        assert!(frames.iter().all(|f| matches!(f.data, FrameData::Json(_))));
    }

    #[test]
    fn call_announcements_become_tool_frames() {
        let body = "I will search now.\n[Called search with args: {foo: 1,}]\nDone.";
        let frames = decode_frames(body.as_bytes());
        assert_eq!(frames[0], StreamFrame::text("I will search now.\nDone."));
        let tool = json_payloads(&frames)[0];
        assert_eq!(tool["name"], "search");
        assert_eq!(tool["input"], json!({"foo": 1}));
        assert_eq!(tool["stop"], true);
        assert!(tool["toolUseId"].as_str().is_some_and(|id| id.starts_with("call_")));
    }

    #[test]
    fn unrepairable_announcements_are_skipped() {
        let frames = decode_frames(b"text [Called f with args: {a: b}] more");
        assert_eq!(frames, vec![StreamFrame::text("text  more")]);
    }
}
