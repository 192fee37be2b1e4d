use crate::error::TranslateError;
use crate::protocol::canonical::{NormalizedResponse, ResponseMeta, ToolCall};
use crate::protocol::mapping::canonical_stop_to_openai;
use crate::util::unix_now_secs;

use super::{
    next_completion_id, OpenAiChatResponse, OpenAiChoice, OpenAiMessage, OpenAiToolCall,
    OpenAiToolCallFunction, OpenAiUsage,
};

/// Encode a normalized response into the `OpenAI` Chat Completions wire format.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidRequest`] when `meta` fails validation.
pub fn encode_openai_chat_response(
    resp: &NormalizedResponse,
    meta: &ResponseMeta<'_>,
) -> Result<OpenAiChatResponse, TranslateError> {
    meta.validate()?;

    let tool_calls: Vec<OpenAiToolCall> = resp.tool_calls.iter().map(wire_tool_call).collect();
    let content = if resp.text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(resp.text.clone())
    };

    Ok(OpenAiChatResponse {
        id: next_completion_id(),
        object: "chat.completion".to_string(),
        created: unix_now_secs(),
        model: meta.model.to_string(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiMessage {
                role: "assistant".to_string(),
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: canonical_stop_to_openai(resp.stop_reason(meta.cutoff_marker))
                .to_string(),
        }],
        usage: OpenAiUsage {
            prompt_tokens: meta.usage.prompt_tokens,
            completion_tokens: meta.usage.completion_tokens,
            total_tokens: meta.usage.total_tokens(),
        },
    })
}

/// [`encode_openai_chat_response`] serialized to JSON bytes.
///
/// # Errors
///
/// Returns [`TranslateError`] when validation or serialization fails.
pub fn build_openai_chat_payload(
    resp: &NormalizedResponse,
    meta: &ResponseMeta<'_>,
) -> Result<Vec<u8>, TranslateError> {
    let wire = encode_openai_chat_response(resp, meta)?;
    Ok(serde_json::to_vec(&wire)?)
}

fn wire_tool_call(call: &ToolCall) -> OpenAiToolCall {
    OpenAiToolCall {
        id: call.id.clone(),
        type_: "function".to_string(),
        function: OpenAiToolCallFunction {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}
