use bytes::Bytes;
use serde_json::{json, Value};
use kiro_relay::error::{format_error, TranslateError};
use kiro_relay::interpret::parse_response;
use kiro_relay::protocol::anthropic::{self, AnthropicContentBlock};
use kiro_relay::protocol::canonical::{
    NormalizedResponse, ResponseMeta, TargetDialect, TokenUsage, ToolCall,
};
use kiro_relay::protocol::openai_chat;
use kiro_relay::stream::split_sse_frames;

fn sse_payloads(frames: &[Bytes]) -> Vec<(Option<String>, Value)> {
    let joined: Vec<u8> = frames.concat();
    split_sse_frames(std::str::from_utf8(&joined).expect("utf8"))
        .into_iter()
        .filter(|frame| frame.data != "[DONE]")
        .map(|frame| {
            let value = serde_json::from_str(&frame.data).expect("frame json");
            (frame.event, value)
        })
        .collect()
}

#[test]
fn anthropic_stream_round_trips_through_the_parser() {
    let original = NormalizedResponse::new(
        "Checking the forecast for you.",
        vec![
            ToolCall::new("toolu_1", "get_weather", r#"{"city":"SF","days":3}"#),
            ToolCall::new("toolu_2", "get_time", r#"{"tz":"PST"}"#),
            ToolCall::new("toolu_3", "noop", ""),
        ],
    );
    let meta = ResponseMeta::new("claude-sonnet-4-5", TokenUsage::new(20, 9));
    let frames = anthropic::stream::encode_anthropic_stream(&original, &meta).expect("encode");

    let decoded = parse_response(&frames.concat());
    assert_eq!(decoded.text, original.text);
    assert_eq!(decoded.tool_calls, original.tool_calls);
    assert_eq!(decoded.upstream_stop_reason.as_deref(), Some("tool_use"));
}

#[test]
fn anthropic_payload_uses_lead_in_for_tool_only_responses() {
    let resp = NormalizedResponse::new(
        "",
        vec![ToolCall::new("toolu_7", "search", r#"{"query":"rust"}"#)],
    );
    let meta = ResponseMeta::new("claude", TokenUsage::new(4, 2));
    let wire = anthropic::response_encoder::encode_anthropic_response(&resp, &meta).expect("encode");

    assert_eq!(wire.content.len(), 2);
    assert_eq!(
        wire.content[0],
        AnthropicContentBlock::Text {
            text: "Calling search to handle this request.".to_string()
        }
    );
    assert!(matches!(
        &wire.content[1],
        AnthropicContentBlock::ToolUse { id, name, input }
            if id == "toolu_7" && name == "search" && *input == json!({"query": "rust"})
    ));
    assert_eq!(wire.stop_reason, "tool_use");
    assert!(wire.stop_sequence.is_none());
}

#[test]
fn openai_stream_chunk_order() {
    let resp = NormalizedResponse::new(
        "Looking it up.",
        vec![ToolCall::new("call_1", "lookup", r#"{"id":42}"#)],
    );
    let meta = ResponseMeta::new("gpt-4o", TokenUsage::new(8, 6));
    let frames = openai_chat::stream::encode_openai_chat_stream(&resp, &meta, true).expect("encode");

    let last = frames.last().expect("frames");
    assert_eq!(&last[..], b"data: [DONE]\n\n");

    let chunks = sse_payloads(&frames);
    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|(event, _)| event.is_none()));
    let ids: Vec<&Value> = chunks.iter().map(|(_, chunk)| &chunk["id"]).collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));

    assert_eq!(chunks[0].1["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(chunks[1].1["choices"][0]["delta"]["content"], "Looking it up.");
    let call = &chunks[2].1["choices"][0]["delta"]["tool_calls"][0];
    assert_eq!(call["function"]["name"], "lookup");
    assert_eq!(call["function"]["arguments"], r#"{"id":42}"#);
    assert_eq!(chunks[3].1["choices"][0]["finish_reason"], "tool_calls");
    assert_eq!(chunks[3].1["usage"]["total_tokens"], 14);
}

#[test]
fn openai_stream_without_text_or_tools_is_role_and_close() {
    let resp = NormalizedResponse::new("  ", vec![]);
    let meta = ResponseMeta::new("gpt-4o", TokenUsage::default());
    let frames = openai_chat::stream::encode_openai_chat_stream(&resp, &meta, false).expect("encode");
    let chunks = sse_payloads(&frames);
    assert_eq!(frames.len(), 2);
    assert_eq!(chunks[1].1["choices"][0]["finish_reason"], "stop");
}

#[test]
fn openai_payload_matches_chat_completion_shape() {
    let resp = NormalizedResponse::new("Hello!", vec![]);
    let meta = ResponseMeta::new("gpt-4o", TokenUsage::new(3, 2));
    let payload = openai_chat::response_encoder::build_openai_chat_payload(&resp, &meta).expect("encode");
    let value: Value = serde_json::from_slice(&payload).expect("json");
    assert_eq!(value["object"], "chat.completion");
    assert_eq!(value["model"], "gpt-4o");
    assert_eq!(value["choices"][0]["message"]["role"], "assistant");
    assert_eq!(value["choices"][0]["message"]["content"], "Hello!");
    assert!(value["choices"][0]["message"].get("tool_calls").is_none());
    assert_eq!(
        value["usage"],
        json!({"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5})
    );
}

#[test]
fn invalid_input_never_yields_a_payload() {
    let resp = NormalizedResponse::new("text", vec![]);
    let negative = ResponseMeta::new("claude", TokenUsage::new(-1, 0));
    assert!(anthropic::response_encoder::build_anthropic_payload(&resp, &negative).is_err());
    assert!(anthropic::stream::encode_anthropic_stream(&resp, &negative).is_err());
    assert!(openai_chat::stream::encode_openai_chat_stream(&resp, &negative, true).is_err());
}

#[test]
fn errors_render_per_dialect() {
    let err = TranslateError::InvalidRequest("model cannot be empty".to_string());

    let (status, body) = format_error(&err, TargetDialect::OpenAiChat);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let (status, body) = format_error(&err, TargetDialect::Anthropic);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "error");
    assert!(body["error"]["message"]
        .as_str()
        .is_some_and(|message| message.contains("model cannot be empty")));

    let err = TranslateError::Translation("boom".to_string());
    let (status, _) = format_error(&err, TargetDialect::Anthropic);
    assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
}
