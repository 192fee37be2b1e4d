//! Assistant text cleanup and tool-call id hygiene.

use regex_lite::Regex;
use std::sync::LazyLock;

use crate::util::next_call_id;

/// Header-like lines the upstream event-stream envelope leaks into text.
const PROTOCOL_NOISE_PREFIXES: &[&str] = &[
    "event-type",
    "message-type",
    "content-length",
    "amz-sdk-request",
    "x-amzn",
    "amzn-",
    "transfer-encoding",
];

static PROTOCOL_NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)content-type\s*[: ]*\s*application/json",
        r"(?i)content-type",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static COLLAPSE_WHITESPACE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[ \f\r]+").ok());

/// Tuning knobs for [`sanitize_assistant_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Return whitespace-only input as-is instead of empty.
    pub allow_blank: bool,
    /// Trim each line and collapse runs of spaces.
    pub collapse_whitespace: bool,
    /// Trim the final result.
    pub trim_result: bool,
    pub drop_empty_lines: bool,
}

impl SanitizeOptions {
    /// Final assistant text: layout preserved, outer whitespace trimmed.
    pub const ASSISTANT_TEXT: Self = Self {
        allow_blank: false,
        collapse_whitespace: false,
        trim_result: true,
        drop_empty_lines: false,
    };

    /// A streamed chunk: whitespace is significant across chunk boundaries.
    pub const STREAM_CHUNK: Self = Self {
        allow_blank: true,
        collapse_whitespace: false,
        trim_result: false,
        drop_empty_lines: false,
    };
}

/// Strip control characters and protocol noise from assistant text.
///
/// `\n` and `\t` survive, `\v` becomes a space, `\r` and every other control
/// character are removed. Lines that look like leaked envelope headers are
/// dropped.
#[must_use]
pub fn sanitize_assistant_text(text: &str, opts: SanitizeOptions) -> String {
    if !opts.allow_blank && text.trim().is_empty() {
        return String::new();
    }

    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' | '\t' => cleaned.push(ch),
            '\u{0b}' => cleaned.push(' '),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }
    if cleaned.is_empty() {
        return cleaned;
    }

    for pattern in PROTOCOL_NOISE_PATTERNS.iter() {
        if pattern.is_match(&cleaned) {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
    }

    let mut filtered: Vec<&str> = Vec::new();
    for line in cleaned.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !opts.drop_empty_lines {
                filtered.push(line);
            }
            continue;
        }
        if is_protocol_noise_line(trimmed) {
            continue;
        }
        filtered.push(if opts.collapse_whitespace { trimmed } else { line });
    }

    let mut result = filtered.join("\n");
    if opts.collapse_whitespace {
        if let Some(collapse) = COLLAPSE_WHITESPACE.as_ref() {
            result = collapse.replace_all(&result, " ").into_owned();
        }
    }
    if opts.trim_result {
        result = result.trim().to_string();
    }
    if !opts.allow_blank && result.trim().is_empty() {
        return String::new();
    }
    result
}

fn is_protocol_noise_line(trimmed: &str) -> bool {
    let lower = trimmed.to_ascii_lowercase();
    PROTOCOL_NOISE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// A usable tool-call id: the trimmed input, or a generated one when blank.
#[must_use]
pub fn sanitize_tool_call_id(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        next_call_id()
    } else {
        trimmed.to_string()
    }
}
