//! Incremental conversion of a legacy upstream stream into Anthropic SSE.
//!
//! The builder assigns its own content-block indices in emission order. Text
//! deltas go out as they arrive. A tool call is held until it stops and then
//! goes out as one start/delta/stop triple; a call repeating the name and
//! arguments of one already sent is dropped.

use bytes::Bytes;
use rustc_hash::FxHashSet;

use crate::accumulator::{dedup_tool_calls, ToolCallSet};
use crate::error::TranslateError;
use crate::interpret::{apply_tool_event, drive, EventSink, ToolTouch, UpstreamEvent};
use crate::observability::token_counter::estimate_output_tokens;
use crate::protocol::canonical::{
    CanonicalStopReason, ResponseMeta, TokenUsage, DEFAULT_CUTOFF_MARKER,
};
use crate::protocol::mapping::{canonical_stop_to_anthropic, FOLLOWUP_STOP_REASON};
use crate::sanitize::{sanitize_assistant_text, SanitizeOptions};
use crate::stream::decode_frames;

use super::next_message_id;
use super::stream::{
    block_stop_frame, input_json_delta_frame, message_delta_frame, message_start_frame,
    message_stop_frame, text_block_start_frame, text_delta_frame, tool_block_start_frame,
};

/// Streaming [`EventSink`] producing Anthropic frames as events arrive.
#[derive(Debug)]
pub struct LegacyStreamBuilder {
    message_id: String,
    model: String,
    cutoff_marker: String,
    prompt_tokens: i64,
    completion_tokens: Option<i64>,

    pending: Vec<Bytes>,
    started: bool,
    seen_payload: bool,
    next_index: usize,
    text_block: Option<usize>,
    /// Touched call ids, first-seen order.
    tool_order: Vec<String>,
    closed: FxHashSet<String>,
    sent: FxHashSet<(String, String)>,
    tool_blocks: usize,
    tools: ToolCallSet,
    text: String,
    stop_reason: Option<String>,
    followup: bool,
}

impl LegacyStreamBuilder {
    #[must_use]
    pub fn new(model: &str, prompt_tokens: i64) -> Self {
        Self {
            message_id: next_message_id(),
            model: model.to_string(),
            cutoff_marker: DEFAULT_CUTOFF_MARKER.to_string(),
            prompt_tokens,
            completion_tokens: None,
            pending: Vec::with_capacity(16),
            started: false,
            seen_payload: false,
            next_index: 0,
            text_block: None,
            tool_order: Vec::new(),
            closed: FxHashSet::default(),
            sent: FxHashSet::default(),
            tool_blocks: 0,
            tools: ToolCallSet::new(),
            text: String::new(),
            stop_reason: None,
            followup: false,
        }
    }

    /// Report this count in `message_delta` instead of an estimate.
    #[must_use]
    pub fn with_completion_tokens(mut self, completion_tokens: i64) -> Self {
        self.completion_tokens = Some(completion_tokens);
        self
    }

    #[must_use]
    pub fn with_cutoff_marker(mut self, marker: &str) -> Self {
        self.cutoff_marker = marker.to_string();
        self
    }

    /// Whether any text or tool call has been seen.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.seen_payload
    }

    /// Drain the frames produced so far.
    pub fn take_frames(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.pending)
    }

    /// Close every open block and append `message_delta` and `message_stop`.
    ///
    /// Returns the frames not yet taken, or nothing at all when the stream
    /// carried no payload.
    #[must_use]
    pub fn finish(mut self) -> Vec<Bytes> {
        if !self.seen_payload {
            return Vec::new();
        }

        self.close_text_block();
        for id in std::mem::take(&mut self.tool_order) {
            self.tools.finalize(&id);
            self.send_tool(&id);
        }

        let has_tools = self.tool_blocks > 0;
        let truncated =
            !self.cutoff_marker.is_empty() && self.text.contains(self.cutoff_marker.as_str());
        let stop_reason = match self.stop_reason.as_deref() {
            _ if self.followup => FOLLOWUP_STOP_REASON,
            Some(hint) => hint,
            None if has_tools => canonical_stop_to_anthropic(CanonicalStopReason::ToolCalls),
            None if truncated => canonical_stop_to_anthropic(CanonicalStopReason::MaxTokens),
            None => canonical_stop_to_anthropic(CanonicalStopReason::EndOfTurn),
        };

        let completion_tokens = match self.completion_tokens {
            Some(count) => count,
            None => {
                let calls = dedup_tool_calls(std::mem::take(&mut self.tools).into_calls());
                estimate_output_tokens(&self.text, &calls)
            }
        };
        let usage = TokenUsage::new(self.prompt_tokens, completion_tokens);

        tracing::debug!(
            message_id = %self.message_id,
            stop_reason,
            tool_blocks = self.tool_blocks,
            "finished legacy stream"
        );
        let frame = message_delta_frame(stop_reason, self.followup, usage);
        self.pending.push(frame);
        self.pending.push(message_stop_frame());
        self.pending
    }

    fn ensure_message_start(&mut self) {
        if !self.started {
            self.pending
                .push(message_start_frame(&self.message_id, &self.model));
            self.started = true;
        }
    }

    fn append_text(&mut self, text: &str) {
        let chunk = sanitize_assistant_text(text, SanitizeOptions::STREAM_CHUNK);
        if chunk.is_empty() {
            return;
        }
        self.seen_payload = true;
        self.ensure_message_start();
        let index = match self.text_block {
            Some(index) => index,
            None => {
                let index = self.next_index;
                self.next_index += 1;
                self.pending.push(text_block_start_frame(index));
                self.text_block = Some(index);
                index
            }
        };
        self.pending.push(text_delta_frame(index, &chunk));
        self.text.push_str(&chunk);
    }

    fn close_text_block(&mut self) {
        if let Some(index) = self.text_block.take() {
            self.pending.push(block_stop_frame(index));
        }
    }

    fn touch_tool(&mut self, touch: ToolTouch) {
        self.seen_payload = true;
        if touch.stopped {
            self.send_tool(&touch.id);
        } else if !self.tool_order.contains(&touch.id) {
            self.tool_order.push(touch.id);
        }
    }

    /// Emit the finalized call `id` as a complete block, at most once.
    fn send_tool(&mut self, id: &str) {
        if !self.closed.insert(id.to_string()) {
            return;
        }
        let Some(acc) = self.tools.get(id) else {
            return;
        };
        let call = &acc.call;
        if !self.sent.insert((call.name.clone(), call.arguments.clone())) {
            tracing::debug!(id, name = %call.name, "dropping repeated tool call");
            return;
        }
        let arguments = if call.arguments.is_empty() {
            acc.fragments()
        } else {
            call.arguments.as_str()
        };

        if let Some(index) = self.text_block.take() {
            self.pending.push(block_stop_frame(index));
        }
        if !self.started {
            self.pending
                .push(message_start_frame(&self.message_id, &self.model));
            self.started = true;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.pending
            .push(tool_block_start_frame(index, &call.id, &call.name));
        if !arguments.is_empty() {
            self.pending.push(input_json_delta_frame(index, arguments));
        }
        self.pending.push(block_stop_frame(index));
        self.tool_blocks += 1;
    }
}

impl EventSink for LegacyStreamBuilder {
    fn on_event(&mut self, event: UpstreamEvent<'_>) {
        match event {
            UpstreamEvent::Text(text) => self.append_text(&text),
            UpstreamEvent::StopReason(reason) => self.stop_reason = Some(reason.to_string()),
            UpstreamEvent::Followup => self.followup = true,
            tool_event => {
                if let Some(touch) = apply_tool_event(&mut self.tools, &tool_event) {
                    self.touch_tool(touch);
                }
            }
        }
    }
}

/// Convert a raw legacy upstream body into Anthropic SSE frames.
///
/// With `estimate_completion` set the completion count in `meta` is ignored
/// and estimated from the streamed content instead. An empty result means
/// the body carried no payload and the caller should fall back to the
/// buffered encoder.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidRequest`] when `meta` fails validation.
pub fn build_legacy_stream(
    raw: &[u8],
    meta: &ResponseMeta<'_>,
    estimate_completion: bool,
) -> Result<Vec<Bytes>, TranslateError> {
    meta.validate()?;

    let frames = decode_frames(raw);
    if frames.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = LegacyStreamBuilder::new(meta.model, meta.usage.prompt_tokens)
        .with_cutoff_marker(meta.cutoff_marker);
    if !estimate_completion {
        builder = builder.with_completion_tokens(meta.usage.completion_tokens);
    }
    drive(&frames, &mut builder);
    Ok(builder.finish())
}
