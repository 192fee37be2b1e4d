//! Anthropic SSE frame writers and the buffered stream encoder.
//!
//! Frames are written straight into strings; the payloads are small and
//! fixed-shape, so going through `serde_json::Value` buys nothing.

use bytes::Bytes;

use crate::error::TranslateError;
use crate::protocol::canonical::{NormalizedResponse, ResponseMeta, TokenUsage};
use crate::protocol::mapping::canonical_stop_to_anthropic;
use crate::repair::decode_or_wrap;
use crate::util::{push_json_string_escaped, push_usize_decimal};

use super::next_message_id;

// ---------------------------------------------------------------------------
// Frame writers
// ---------------------------------------------------------------------------

pub(crate) fn message_start_frame(id: &str, model: &str) -> Bytes {
    let mut out = String::with_capacity(224 + id.len() + model.len());
    out.push_str("event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":");
    push_json_string_escaped(&mut out, id);
    out.push_str(",\"type\":\"message\",\"role\":\"assistant\",\"model\":");
    push_json_string_escaped(&mut out, model);
    out.push_str(
        ",\"content\":[],\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":0,\"output_tokens\":0}}}\n\n",
    );
    Bytes::from(out)
}

pub(crate) fn text_block_start_frame(index: usize) -> Bytes {
    let mut out = String::with_capacity(128);
    out.push_str("event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":");
    push_usize_decimal(&mut out, index);
    out.push_str(",\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n");
    Bytes::from(out)
}

pub(crate) fn tool_block_start_frame(index: usize, id: &str, name: &str) -> Bytes {
    let mut out = String::with_capacity(160 + id.len() + name.len());
    out.push_str("event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":");
    push_usize_decimal(&mut out, index);
    out.push_str(",\"content_block\":{\"type\":\"tool_use\",\"id\":");
    push_json_string_escaped(&mut out, id);
    out.push_str(",\"name\":");
    push_json_string_escaped(&mut out, name);
    out.push_str(",\"input\":{}}}\n\n");
    Bytes::from(out)
}

pub(crate) fn text_delta_frame(index: usize, text: &str) -> Bytes {
    let mut out = String::with_capacity(128 + text.len());
    out.push_str("event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":");
    push_usize_decimal(&mut out, index);
    out.push_str(",\"delta\":{\"type\":\"text_delta\",\"text\":");
    push_json_string_escaped(&mut out, text);
    out.push_str("}}\n\n");
    Bytes::from(out)
}

pub(crate) fn input_json_delta_frame(index: usize, partial_json: &str) -> Bytes {
    let mut out = String::with_capacity(144 + partial_json.len());
    out.push_str("event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":");
    push_usize_decimal(&mut out, index);
    out.push_str(",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":");
    push_json_string_escaped(&mut out, partial_json);
    out.push_str("}}\n\n");
    Bytes::from(out)
}

pub(crate) fn block_stop_frame(index: usize) -> Bytes {
    let mut out = String::with_capacity(96);
    out.push_str("event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":");
    push_usize_decimal(&mut out, index);
    out.push_str("}\n\n");
    Bytes::from(out)
}

pub(crate) fn message_delta_frame(stop_reason: &str, followup: bool, usage: TokenUsage) -> Bytes {
    let mut out = String::with_capacity(192);
    out.push_str("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":");
    push_json_string_escaped(&mut out, stop_reason);
    out.push_str(",\"stop_sequence\":null");
    if followup {
        out.push_str(",\"followup_prompt\":true");
    }
    out.push_str("},\"usage\":{\"input_tokens\":");
    out.push_str(&usage.prompt_tokens.to_string());
    out.push_str(",\"output_tokens\":");
    out.push_str(&usage.completion_tokens.to_string());
    out.push_str("}}\n\n");
    Bytes::from(out)
}

pub(crate) fn message_stop_frame() -> Bytes {
    Bytes::from_static(b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n")
}

// ---------------------------------------------------------------------------
// Buffered encoder
// ---------------------------------------------------------------------------

/// Encode a normalized response as a complete Anthropic event stream.
///
/// Tool blocks come first at indices `0..n`, then the text block at `n` when
/// the text is not blank. Tool arguments are re-encoded from their decoded
/// form, or wrapped as `{"value": raw}` when they cannot be decoded. A call
/// without arguments gets no `input_json_delta`.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidRequest`] when `meta` fails validation.
pub fn encode_anthropic_stream(
    resp: &NormalizedResponse,
    meta: &ResponseMeta<'_>,
) -> Result<Vec<Bytes>, TranslateError> {
    meta.validate()?;

    let mut frames = Vec::with_capacity(4 + 3 * (resp.tool_calls.len() + 1));
    frames.push(message_start_frame(&next_message_id(), meta.model));

    for (index, call) in resp.tool_calls.iter().enumerate() {
        frames.push(tool_block_start_frame(index, &call.id, &call.name));
        if !call.arguments.is_empty() {
            let input = decode_or_wrap(&call.arguments);
            frames.push(input_json_delta_frame(index, &serde_json::to_string(&input)?));
        }
        frames.push(block_stop_frame(index));
    }

    if !resp.text.trim().is_empty() {
        let index = resp.tool_calls.len();
        frames.push(text_block_start_frame(index));
        frames.push(text_delta_frame(index, &resp.text));
        frames.push(block_stop_frame(index));
    }

    let stop_reason = canonical_stop_to_anthropic(resp.stop_reason(meta.cutoff_marker));
    frames.push(message_delta_frame(stop_reason, false, meta.usage));
    frames.push(message_stop_frame());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent};
    use crate::protocol::canonical::ToolCall;
    use crate::stream::split_sse_frames;

    fn events(frames: &[Bytes]) -> Vec<(String, AnthropicStreamEvent)> {
        let body: Vec<u8> = frames.concat();
        split_sse_frames(std::str::from_utf8(&body).expect("utf8"))
            .into_iter()
            .map(|frame| {
                let event = serde_json::from_str(&frame.data).expect("event json");
                (frame.event.unwrap_or_default(), event)
            })
            .collect()
    }

    #[test]
    fn test_text_only_stream() {
        let resp = NormalizedResponse::new("Hi \"you\"", vec![]);
        let meta = ResponseMeta::new("claude", TokenUsage::new(7, 2));
        let parsed = events(&encode_anthropic_stream(&resp, &meta).expect("encode"));
        let names: Vec<&str> = parsed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert!(matches!(
            &parsed[2].1,
            AnthropicStreamEvent::ContentBlockDelta { index: 0, delta: AnthropicDelta::TextDelta { text } }
                if text == "Hi \"you\""
        ));
        match &parsed[4].1 {
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason.as_deref(), Some("end_turn"));
                assert_eq!(delta.followup_prompt, None);
                assert_eq!(usage.input_tokens, 7);
                assert_eq!(usage.output_tokens, 2);
            }
            other => panic!("expected message_delta, got {other:?}"),
        }
    }

    #[test]
    fn test_tools_precede_text() {
        let resp = NormalizedResponse::new(
            "done",
            vec![
                ToolCall::new("toolu_1", "lookup", r#"{"q":"a"}"#),
                ToolCall::new("toolu_2", "raw", "not json"),
            ],
        );
        let meta = ResponseMeta::new("claude", TokenUsage::default());
        let parsed = events(&encode_anthropic_stream(&resp, &meta).expect("encode"));
        assert!(matches!(
            &parsed[1].1,
            AnthropicStreamEvent::ContentBlockStart { index: 0, content_block: AnthropicContentBlock::ToolUse { id, .. } }
                if id == "toolu_1"
        ));
        assert!(matches!(
            &parsed[5].1,
            AnthropicStreamEvent::ContentBlockDelta { index: 1, delta: AnthropicDelta::InputJsonDelta { partial_json } }
                if partial_json == r#"{"value":"not json"}"#
        ));
        assert!(matches!(
            &parsed[7].1,
            AnthropicStreamEvent::ContentBlockStart { index: 2, content_block: AnthropicContentBlock::Text { .. } }
        ));
        assert!(matches!(
            &parsed[10].1,
            AnthropicStreamEvent::MessageDelta { delta, .. } if delta.stop_reason.as_deref() == Some("tool_use")
        ));
    }

    #[test]
    fn test_message_delta_carries_followup_flag() {
        let frame = message_delta_frame("followup", true, TokenUsage::new(1, 2));
        let text = std::str::from_utf8(&frame).expect("utf8");
        assert!(text.contains("\"followup_prompt\":true"));
        assert!(text.contains("\"stop_sequence\":null"));
    }
}
