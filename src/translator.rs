//! Entry point tying parsing and encoding together.

use bytes::Bytes;
use std::time::Instant;

use crate::config::TranslatorConfig;
use crate::error::TranslateError;
use crate::interpret::{is_one_shot_body, parse_response};
use crate::models::ModelAliases;
use crate::observability::token_counter::{estimate_output_tokens, log_translation_usage};
use crate::protocol::anthropic::legacy::build_legacy_stream;
use crate::protocol::anthropic::response_encoder::build_anthropic_payload;
use crate::protocol::anthropic::stream::encode_anthropic_stream;
use crate::protocol::canonical::{
    DeliveryMode, NormalizedResponse, ResponseMeta, TargetDialect, TokenUsage,
};
use crate::protocol::openai_chat::response_encoder::build_openai_chat_payload;
use crate::protocol::openai_chat::stream::encode_openai_chat_stream;

/// What the caller wants back for one upstream body.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    /// Client-facing model name echoed in the output.
    pub client_model: &'a str,
    pub target: TargetDialect,
    pub mode: DeliveryMode,
    pub prompt_tokens: i64,
    /// Upstream-reported completion count; estimated from the output when absent.
    pub completion_tokens: Option<i64>,
}

impl<'a> TranslationRequest<'a> {
    #[must_use]
    pub fn new(client_model: &'a str, target: TargetDialect, mode: DeliveryMode) -> Self {
        Self {
            client_model,
            target,
            mode,
            prompt_tokens: 0,
            completion_tokens: None,
        }
    }

    #[must_use]
    pub fn with_prompt_tokens(mut self, prompt_tokens: i64) -> Self {
        self.prompt_tokens = prompt_tokens;
        self
    }

    #[must_use]
    pub fn with_completion_tokens(mut self, completion_tokens: i64) -> Self {
        self.completion_tokens = Some(completion_tokens);
        self
    }
}

/// A translated response, ready for the transport to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslatedOutput {
    /// One JSON body.
    Payload(Bytes),
    /// SSE frames to write in order.
    Chunks(Vec<Bytes>),
}

impl TranslatedOutput {
    /// Everything concatenated, as it would appear on the wire.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            TranslatedOutput::Payload(body) => body,
            TranslatedOutput::Chunks(frames) => Bytes::from(frames.concat()),
        }
    }
}

/// Configured translator. Cheap to share; holds no per-response state.
#[derive(Debug, Clone)]
pub struct Translator {
    aliases: ModelAliases,
    cutoff_marker: String,
    emit_done_frame: bool,
}

impl Translator {
    #[must_use]
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            aliases: ModelAliases::new(&config.model_aliases, &config.default_model),
            cutoff_marker: config.cutoff_marker.clone(),
            emit_done_frame: config.emit_done_frame,
        }
    }

    /// Upstream model id for a client-facing model name.
    #[must_use]
    pub fn upstream_model(&self, client_model: &str) -> &str {
        self.aliases.resolve(client_model)
    }

    /// Parse a raw upstream body without encoding it.
    #[must_use]
    pub fn normalize(&self, body: &[u8]) -> NormalizedResponse {
        parse_response(body)
    }

    /// Translate a complete upstream body for the requested dialect and mode.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::InvalidRequest`] for an empty model name or a
    /// negative token count, and [`TranslateError::Translation`] when the
    /// output cannot be serialized.
    pub fn translate(
        &self,
        body: &[u8],
        request: &TranslationRequest<'_>,
    ) -> Result<TranslatedOutput, TranslateError> {
        let started = Instant::now();
        let resp = parse_response(body);
        let completion_tokens = request
            .completion_tokens
            .unwrap_or_else(|| estimate_output_tokens(&resp.text, &resp.tool_calls));
        let usage = TokenUsage::new(request.prompt_tokens, completion_tokens);
        let meta = ResponseMeta::new(request.client_model, usage)
            .with_cutoff_marker(&self.cutoff_marker);

        let output = match (request.target, request.mode) {
            (TargetDialect::OpenAiChat, DeliveryMode::OneShot) => {
                TranslatedOutput::Payload(Bytes::from(build_openai_chat_payload(&resp, &meta)?))
            }
            (TargetDialect::OpenAiChat, DeliveryMode::Streaming) => TranslatedOutput::Chunks(
                encode_openai_chat_stream(&resp, &meta, self.emit_done_frame)?,
            ),
            (TargetDialect::Anthropic, DeliveryMode::OneShot) => {
                TranslatedOutput::Payload(Bytes::from(build_anthropic_payload(&resp, &meta)?))
            }
            (TargetDialect::Anthropic, DeliveryMode::Streaming) => {
                TranslatedOutput::Chunks(self.anthropic_stream(body, &resp, &meta)?)
            }
        };

        log_translation_usage(request.client_model, &usage, started.elapsed());
        Ok(output)
    }

    /// Streamed bodies are replayed through the legacy builder so upstream
    /// stop reasons and followup markers survive; documents, and streams that
    /// carried nothing, go through the buffered encoder.
    fn anthropic_stream(
        &self,
        body: &[u8],
        resp: &NormalizedResponse,
        meta: &ResponseMeta<'_>,
    ) -> Result<Vec<Bytes>, TranslateError> {
        if !is_one_shot_body(body) {
            let frames = build_legacy_stream(body, meta, false)?;
            if !frames.is_empty() {
                return Ok(frames);
            }
            tracing::debug!("legacy stream carried no payload, using buffered encoder");
        }
        encode_anthropic_stream(resp, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> Translator {
        Translator::new(&TranslatorConfig::default())
    }

    #[test]
    fn aliases_resolve_through_config() {
        let mut config = TranslatorConfig::default();
        config
            .model_aliases
            .insert("my-model".to_string(), "UPSTREAM_X".to_string());
        let translator = Translator::new(&config);
        assert_eq!(translator.upstream_model("my-model"), "UPSTREAM_X");
        assert_eq!(translator.upstream_model("unknown"), config.default_model);
    }

    #[test]
    fn missing_completion_count_is_estimated() {
        let request = TranslationRequest::new("gpt-4o", TargetDialect::OpenAiChat, DeliveryMode::OneShot)
            .with_prompt_tokens(5);
        let out = translator()
            .translate(br#"{"content":"hello there"}"#, &request)
            .expect("translate");
        let TranslatedOutput::Payload(body) = out else {
            panic!("expected payload");
        };
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["usage"]["prompt_tokens"], 5);
        assert_eq!(value["usage"]["completion_tokens"], 3);
        assert_eq!(value["usage"]["total_tokens"], 8);
    }

    #[test]
    fn anthropic_stream_keeps_upstream_stop_reason() {
        let request = TranslationRequest::new("claude", TargetDialect::Anthropic, DeliveryMode::Streaming)
            .with_completion_tokens(2);
        let body = b"data: {\"content\":\"hi\"}\n\ndata: {\"delta\":{\"stop_reason\":\"canceled\"}}\n\n";
        let wire = translator().translate(body, &request).expect("translate").into_bytes();
        let text = std::str::from_utf8(&wire).expect("utf8");
        assert!(text.contains("\"stop_reason\":\"canceled\""));
        assert!(text.ends_with("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"));
    }

    #[test]
    fn documents_stream_through_buffered_encoder() {
        let request = TranslationRequest::new("claude", TargetDialect::Anthropic, DeliveryMode::Streaming);
        let out = translator()
            .translate(br#"{"content":"doc"}"#, &request)
            .expect("translate");
        let TranslatedOutput::Chunks(frames) = out else {
            panic!("expected chunks");
        };
        assert_eq!(frames.len(), 6);
    }

    #[test]
    fn invalid_request_is_rejected() {
        let request = TranslationRequest::new(" ", TargetDialect::OpenAiChat, DeliveryMode::OneShot);
        let err = translator().translate(b"{}", &request).expect_err("empty model");
        assert!(matches!(err, TranslateError::InvalidRequest(_)));

        let request = TranslationRequest::new("m", TargetDialect::Anthropic, DeliveryMode::Streaming)
            .with_prompt_tokens(-1);
        assert!(translator().translate(b"data: {\"content\":\"x\"}\n\n", &request).is_err());
    }
}
