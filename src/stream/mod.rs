pub mod decoder;
pub mod eventstream;
pub mod sse;

pub use decoder::{decode_frames, decode_text};
pub use sse::split_sse_frames;

use serde_json::Value;

/// A raw SSE frame as split from the upstream body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Payload of one decoded upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    Json(Value),
    /// Prose that carried no JSON at all.
    Text(String),
}

/// One upstream event, ready for interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    /// The SSE `event:` name, else the payload's `type` field.
    pub event_type: Option<String>,
    pub data: FrameData,
}

impl StreamFrame {
    #[must_use]
    pub fn json(event_type: Option<String>, value: Value) -> Self {
        let event_type = event_type.or_else(|| {
            value
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Self {
            event_type,
            data: FrameData::Json(value),
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: FrameData::Text(text.into()),
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        self.event_type.as_deref().unwrap_or_default()
    }
}
