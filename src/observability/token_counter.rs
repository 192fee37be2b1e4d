use crate::protocol::canonical::{TokenUsage, ToolCall};
use std::time::Duration;
use tracing::info;

/// Fixed per-call overhead charged for every tool invocation.
const TOOL_CALL_BASE_TOKENS: i64 = 3;

/// Approximate token count of `len` bytes at ~3.5 bytes per token.
#[inline]
fn tokens_for_len(len: usize) -> i64 {
    i64::try_from(len.saturating_mul(2) / 7).unwrap_or(i64::MAX)
}

/// Estimate output tokens for a completion the upstream did not count.
///
/// Uses a lightweight heuristic (~3.5 bytes per token) rather than a real
/// tokenizer. Anything non-empty is at least one token.
#[must_use]
pub fn estimate_output_tokens(text: &str, tool_calls: &[ToolCall]) -> i64 {
    let has_text = !text.trim().is_empty();
    if !has_text && tool_calls.is_empty() {
        return 0;
    }

    let mut total = tokens_for_len(text.len());
    if total == 0 && has_text {
        total = 1;
    }
    for call in tool_calls {
        total = total.saturating_add(TOOL_CALL_BASE_TOKENS);
        total = total.saturating_add(tokens_for_len(call.name.len()));
        if !call.arguments.is_empty() && call.arguments != "null" {
            total = total.saturating_add(tokens_for_len(call.arguments.len()));
        }
    }
    total.max(1)
}

/// Log token usage for a completed translation at INFO level.
pub fn log_translation_usage(model: &str, usage: &TokenUsage, duration: Duration) {
    info!(
        model = model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens(),
        duration_seconds = duration.as_secs_f64(),
        "translation completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_empty_is_zero() {
        assert_eq!(estimate_output_tokens("", &[]), 0);
        assert_eq!(estimate_output_tokens("   ", &[]), 0);
    }

    #[test]
    fn test_estimate_short_text_is_at_least_one() {
        assert_eq!(estimate_output_tokens("hi", &[]), 1);
        assert_eq!(estimate_output_tokens("seven c", &[]), 2);
    }

    #[test]
    fn test_estimate_counts_tool_calls() {
        let calls = [ToolCall::new("t", "lookup_weather", r#"{"city":"San Francisco"}"#)];
        // 3 base + 14/3.5 name + 24/3.5 args
        assert_eq!(estimate_output_tokens("", &calls), 3 + 4 + 6);

        let null_args = [ToolCall::new("t", "f", "null")];
        assert_eq!(estimate_output_tokens("", &null_args), 3);
    }
}
