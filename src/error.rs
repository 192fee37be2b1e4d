use crate::config::ConfigError;
use crate::protocol::canonical::TargetDialect;
use crate::protocol::error_shapes::{anthropic_error_payload, openai_error_payload};

/// Error type shared by the translator and its encoders.
///
/// Malformed upstream content never surfaces here: it is repaired or dropped
/// while parsing. Only caller mistakes and configuration problems do.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Protocol translation error: {0}")]
    Translation(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    ServerError,
}

impl TranslateError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslateError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            TranslateError::Config(_) | TranslateError::Translation(_) => {
                ErrorCategory::ServerError
            }
        }
    }
}

impl From<ConfigError> for TranslateError {
    fn from(err: ConfigError) -> Self {
        TranslateError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TranslateError {
    fn from(err: serde_json::Error) -> Self {
        TranslateError::Translation(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Format an error for a client dialect
// ---------------------------------------------------------------------------

/// Format an error for the given client dialect, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(
    err: &TranslateError,
    dialect: TargetDialect,
) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let message = err.to_string();

    let body = match dialect {
        TargetDialect::OpenAiChat => openai_error_payload(cat, &message),
        TargetDialect::Anthropic => anthropic_error_payload(cat, &message),
    };

    (status, body)
}
