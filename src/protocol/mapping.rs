use super::canonical::CanonicalStopReason;

// ---------------------------------------------------------------------------
// Stop reason mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn canonical_stop_to_openai(reason: CanonicalStopReason) -> &'static str {
    match reason {
        CanonicalStopReason::EndOfTurn => "stop",
        CanonicalStopReason::ToolCalls => "tool_calls",
        CanonicalStopReason::MaxTokens => "length",
    }
}

#[must_use]
pub fn canonical_stop_to_anthropic(reason: CanonicalStopReason) -> &'static str {
    match reason {
        CanonicalStopReason::EndOfTurn => "end_turn",
        CanonicalStopReason::ToolCalls => "tool_use",
        CanonicalStopReason::MaxTokens => "max_tokens",
    }
}

/// Stop reason reported when the upstream asks the client for a followup turn.
pub const FOLLOWUP_STOP_REASON: &str = "followup";
