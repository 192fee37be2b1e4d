use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// Marker the upstream appends to text that was truncated by the token limit.
pub const DEFAULT_CUTOFF_MARKER: &str = "cut off due to max tokens";

/// Which client dialect the translator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDialect {
    /// `OpenAI` chat completions.
    #[serde(alias = "openai")]
    OpenAiChat,
    /// Anthropic messages.
    Anthropic,
}

/// Whether the client asked for one payload or an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    OneShot,
    Streaming,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalStopReason {
    EndOfTurn,
    ToolCalls,
    MaxTokens,
}

/// A reconstructed tool invocation.
///
/// `arguments` is either empty or a syntactically valid JSON document once
/// the call has been finalized.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Token counts supplied by the caller for the usage block.
///
/// Signed so that negative counts can be rejected rather than silently wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(prompt_tokens: i64, completion_tokens: i64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    #[must_use]
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Everything an encoder needs besides the normalized content.
#[derive(Debug, Clone, Copy)]
pub struct ResponseMeta<'a> {
    /// Client-facing model name echoed in the payload.
    pub model: &'a str,
    pub usage: TokenUsage,
    pub cutoff_marker: &'a str,
}

impl<'a> ResponseMeta<'a> {
    #[must_use]
    pub fn new(model: &'a str, usage: TokenUsage) -> Self {
        Self {
            model,
            usage,
            cutoff_marker: DEFAULT_CUTOFF_MARKER,
        }
    }

    #[must_use]
    pub fn with_cutoff_marker(mut self, marker: &'a str) -> Self {
        self.cutoff_marker = marker;
        self
    }

    /// Reject input no payload can be built from.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::InvalidRequest`] for an empty model name or a
    /// negative token count.
    pub fn validate(&self) -> Result<(), TranslateError> {
        if self.model.trim().is_empty() {
            return Err(TranslateError::InvalidRequest(
                "model cannot be empty".to_string(),
            ));
        }
        if self.usage.prompt_tokens < 0 || self.usage.completion_tokens < 0 {
            return Err(TranslateError::InvalidRequest(
                "token count cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// The dialect-independent result of parsing one upstream response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Stop reason reported by the upstream, if any frame carried one.
    pub upstream_stop_reason: Option<String>,
    /// Set when the upstream announced a followup prompt.
    pub followup: bool,
}

impl NormalizedResponse {
    #[must_use]
    pub fn new(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            upstream_stop_reason: None,
            followup: false,
        }
    }

    /// Stop reason the encoders report: tool calls win, then truncation.
    #[must_use]
    pub fn stop_reason(&self, cutoff_marker: &str) -> CanonicalStopReason {
        if !self.tool_calls.is_empty() {
            CanonicalStopReason::ToolCalls
        } else if !cutoff_marker.is_empty() && self.text.contains(cutoff_marker) {
            CanonicalStopReason::MaxTokens
        } else {
            CanonicalStopReason::EndOfTurn
        }
    }
}
