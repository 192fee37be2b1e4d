use crate::error::TranslateError;
use crate::protocol::anthropic::{
    next_message_id, AnthropicContentBlock, AnthropicResponse, AnthropicUsage,
};
use crate::protocol::canonical::{NormalizedResponse, ResponseMeta, ToolCall};
use crate::protocol::mapping::canonical_stop_to_anthropic;
use crate::repair::decode_or_wrap;
use crate::sanitize::{sanitize_assistant_text, SanitizeOptions};

const UNNAMED_TOOL: &str = "the requested tool";

/// Encode a normalized response into the Anthropic Messages API wire format.
///
/// Text comes first. When there is no text but there are tool calls, a short
/// lead-in naming the tools stands in for it so `content` always opens with
/// a text block.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidRequest`] when `meta` fails validation.
pub fn encode_anthropic_response(
    resp: &NormalizedResponse,
    meta: &ResponseMeta<'_>,
) -> Result<AnthropicResponse, TranslateError> {
    meta.validate()?;

    let mut text = sanitize_assistant_text(&resp.text, SanitizeOptions::ASSISTANT_TEXT);
    if text.is_empty() && !resp.tool_calls.is_empty() {
        text = tool_lead_in(&resp.tool_calls);
    }

    let mut content = Vec::with_capacity(resp.tool_calls.len() + 1);
    if !text.is_empty() {
        content.push(AnthropicContentBlock::Text { text });
    }
    for call in &resp.tool_calls {
        content.push(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: decode_or_wrap(&call.arguments),
        });
    }

    Ok(AnthropicResponse {
        id: next_message_id(),
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: meta.model.to_string(),
        content,
        stop_reason: canonical_stop_to_anthropic(resp.stop_reason(meta.cutoff_marker))
            .to_string(),
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: meta.usage.prompt_tokens,
            output_tokens: meta.usage.completion_tokens,
        },
    })
}

/// [`encode_anthropic_response`] serialized to JSON bytes.
///
/// # Errors
///
/// Returns [`TranslateError`] when validation or serialization fails.
pub fn build_anthropic_payload(
    resp: &NormalizedResponse,
    meta: &ResponseMeta<'_>,
) -> Result<Vec<u8>, TranslateError> {
    let wire = encode_anthropic_response(resp, meta)?;
    Ok(serde_json::to_vec(&wire)?)
}

/// "Calling X to handle this request." naming each distinct tool once.
#[must_use]
pub fn tool_lead_in(calls: &[ToolCall]) -> String {
    let mut names: Vec<&str> = Vec::with_capacity(calls.len());
    for call in calls {
        let name = call.name.trim();
        let name = if name.is_empty() { UNNAMED_TOOL } else { name };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    match names.as_slice() {
        [] => String::new(),
        [single] => format!("Calling {single} to handle this request."),
        many => format!("Calling tools {} to handle this request.", many.join(", ")),
    }
}
