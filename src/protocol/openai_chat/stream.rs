use bytes::Bytes;

use crate::error::TranslateError;
use crate::protocol::canonical::{NormalizedResponse, ResponseMeta};
use crate::protocol::mapping::canonical_stop_to_openai;
use crate::stream::sse::DONE_FRAME;
use crate::util::{push_json_string_escaped, push_usize_decimal, unix_now_secs};

use super::next_completion_id;

/// Encode a normalized response as an `OpenAI` chunk stream.
///
/// Chunks, in order: the role delta, the content delta (only for non-blank
/// text), one delta carrying every tool call, the closing chunk with the
/// finish reason and usage, and `[DONE]` when `emit_done` is set.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidRequest`] when `meta` fails validation.
pub fn encode_openai_chat_stream(
    resp: &NormalizedResponse,
    meta: &ResponseMeta<'_>,
    emit_done: bool,
) -> Result<Vec<Bytes>, TranslateError> {
    meta.validate()?;

    let id = next_completion_id();
    let created = unix_now_secs();
    let mut chunks = Vec::with_capacity(5);

    let mut out = String::with_capacity(128 + id.len() + meta.model.len());
    push_openai_chunk_prefix(&mut out, &id, meta.model, created);
    out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n");
    chunks.push(Bytes::from(out));

    if !resp.text.trim().is_empty() {
        let mut out = String::with_capacity(128 + id.len() + meta.model.len() + resp.text.len());
        push_openai_chunk_prefix(&mut out, &id, meta.model, created);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"content\":");
        push_json_string_escaped(&mut out, &resp.text);
        out.push_str("},\"finish_reason\":null}]}\n\n");
        chunks.push(Bytes::from(out));
    }

    if !resp.tool_calls.is_empty() {
        let mut out = String::with_capacity(196 + id.len() + meta.model.len());
        push_openai_chunk_prefix(&mut out, &id, meta.model, created);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[");
        for (index, call) in resp.tool_calls.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push_str("{\"index\":");
            push_usize_decimal(&mut out, index);
            out.push_str(",\"id\":");
            push_json_string_escaped(&mut out, &call.id);
            out.push_str(",\"type\":\"function\",\"function\":{\"name\":");
            push_json_string_escaped(&mut out, &call.name);
            out.push_str(",\"arguments\":");
            push_json_string_escaped(&mut out, &call.arguments);
            out.push_str("}}");
        }
        out.push_str("]},\"finish_reason\":null}]}\n\n");
        chunks.push(Bytes::from(out));
    }

    let usage = meta.usage;
    let mut out = String::with_capacity(192 + id.len() + meta.model.len());
    push_openai_chunk_prefix(&mut out, &id, meta.model, created);
    out.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":");
    push_json_string_escaped(
        &mut out,
        canonical_stop_to_openai(resp.stop_reason(meta.cutoff_marker)),
    );
    out.push_str("}],\"usage\":{\"prompt_tokens\":");
    out.push_str(&usage.prompt_tokens.to_string());
    out.push_str(",\"completion_tokens\":");
    out.push_str(&usage.completion_tokens.to_string());
    out.push_str(",\"total_tokens\":");
    out.push_str(&usage.total_tokens().to_string());
    out.push_str("}}\n\n");
    chunks.push(Bytes::from(out));

    if emit_done {
        chunks.push(Bytes::from_static(DONE_FRAME.as_bytes()));
    }
    Ok(chunks)
}

fn push_openai_chunk_prefix(out: &mut String, id: &str, model: &str, created: u64) {
    out.push_str("data: {\"id\":");
    push_json_string_escaped(out, id);
    out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
    out.push_str(&created.to_string());
    out.push_str(",\"model\":");
    push_json_string_escaped(out, model);
}
