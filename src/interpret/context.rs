use crate::accumulator::{dedup_tool_calls, ToolCallSet};
use crate::protocol::canonical::NormalizedResponse;
use crate::sanitize::{sanitize_assistant_text, SanitizeOptions};

use super::{apply_tool_event, EventSink, UpstreamEvent};

/// Accumulation state for parsing one upstream response.
///
/// Created per response, driven through every frame, then consumed by
/// [`ProcessingContext::finish`]. Dropping it discards unfinished calls.
#[derive(Debug, Default)]
pub struct ProcessingContext {
    text: String,
    tools: ToolCallSet,
    stop_reason: Option<String>,
    followup: bool,
}

impl ProcessingContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw text accumulated so far, before final sanitizing.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn tools(&self) -> &ToolCallSet {
        &self.tools
    }

    /// Finalize every open call and produce the normalized result.
    #[must_use]
    pub fn finish(mut self) -> NormalizedResponse {
        self.tools.finalize_all();
        let tool_calls = dedup_tool_calls(self.tools.into_calls());
        tracing::debug!(
            text_len = self.text.len(),
            tool_calls = tool_calls.len(),
            "finished upstream stream"
        );
        NormalizedResponse {
            text: sanitize_assistant_text(&self.text, SanitizeOptions::ASSISTANT_TEXT),
            tool_calls,
            upstream_stop_reason: self.stop_reason,
            followup: self.followup,
        }
    }
}

impl EventSink for ProcessingContext {
    fn on_event(&mut self, event: UpstreamEvent<'_>) {
        match event {
            UpstreamEvent::Text(text) => self.text.push_str(&text),
            UpstreamEvent::StopReason(reason) => self.stop_reason = Some(reason.to_string()),
            UpstreamEvent::Followup => self.followup = true,
            tool_event => {
                apply_tool_event(&mut self.tools, &tool_event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpret::drive;
    use crate::protocol::canonical::ToolCall;
    use crate::stream::decode_frames;

    fn parse(body: &str) -> NormalizedResponse {
        let mut ctx = ProcessingContext::new();
        drive(&decode_frames(body.as_bytes()), &mut ctx);
        ctx.finish()
    }

    #[test]
    fn delta_stream_rebuilds_text_and_tools() {
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"content\":[]}}\n\n",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello \"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"world\"}}\n\n",
            "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\",\"input\":{}}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\"\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\":\\\"SF\\\"}\"}}\n\n",
            "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
            "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        let resp = parse(body);
        assert_eq!(resp.text, "Hello world");
        assert_eq!(
            resp.tool_calls,
            vec![ToolCall::new("toolu_1", "get_weather", r#"{"city":"SF"}"#)]
        );
        assert_eq!(resp.upstream_stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn unfinished_calls_are_finalized_at_end() {
        let body = concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"t\",\"name\":\"f\",\"input\":{\"a\":1}}}\n\n",
            "data: {\"name\":\"g\",\"toolUseId\":\"u\",\"input\":\"{x: 2,\"}\n\n",
            "data: {\"name\":\"g\",\"toolUseId\":\"u\",\"input\":\"}\"}\n\n",
        );
        let resp = parse(body);
        assert_eq!(
            resp.tool_calls,
            vec![
                ToolCall::new("t", "f", r#"{"a":1}"#),
                ToolCall::new("u", "g", r#"{"x": 2}"#),
            ]
        );
    }

    #[test]
    fn followup_and_bookkeeping_frames_add_no_text() {
        let body = concat!(
            "data: {\"content\":\"Answer\"}\n\n",
            "data: {\"unit\":\"credit\",\"unitPlural\":\"credits\",\"usage\":0.2}\n\n",
            "data: {\"contextUsagePercentage\":42.5}\n\n",
            "data: {\"followupPrompt\":true,\"content\":\"Ask me more\"}\n\n",
        );
        let resp = parse(body);
        assert_eq!(resp.text, "Answer");
        assert!(resp.followup);
    }

    #[test]
    fn duplicate_calls_collapse() {
        let body = concat!(
            "data: {\"name\":\"f\",\"toolUseId\":\"a\",\"input\":{\"q\":1},\"stop\":true}\n\n",
            "data: {\"name\":\"f\",\"toolUseId\":\"b\",\"input\":{\"q\":1},\"stop\":true}\n\n",
        );
        let resp = parse(body);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "a");
    }
}
