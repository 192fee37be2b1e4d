//! Binary AWS event-stream envelope stripping.
//!
//! Each message is a 12-byte prelude (total length, headers length, prelude
//! CRC, all big-endian `u32`), the headers, the payload, and a trailing
//! 4-byte message CRC. Only the payload matters here; CRCs are not checked.

use bytes::Buf;
use std::borrow::Cow;

use crate::interpret::events::is_bookkeeping_payload;

const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + MESSAGE_CRC_LEN;

/// Replace an event-stream body with its text payloads joined by blank lines.
///
/// Input that does not start with a well-formed message is returned untouched.
#[must_use]
pub fn normalize_payload(raw: &[u8]) -> Cow<'_, [u8]> {
    let mut buf = raw;
    let mut out = Vec::new();
    let mut processed = false;

    while buf.len() >= MIN_MESSAGE_LEN {
        let mut prelude = &buf[..PRELUDE_LEN];
        let total_len = prelude.get_u32() as usize;
        let headers_len = prelude.get_u32() as usize;

        if total_len < MIN_MESSAGE_LEN || total_len > buf.len() {
            break;
        }
        if headers_len > total_len - MIN_MESSAGE_LEN {
            break;
        }

        let payload = &buf[PRELUDE_LEN + headers_len..total_len - MESSAGE_CRC_LEN];
        processed = true;
        let text = extract_json_payload(payload);
        if !text.is_empty() {
            if !out.is_empty() {
                out.extend_from_slice(b"\n\n");
            }
            out.extend_from_slice(text.as_bytes());
        }
        buf = &buf[total_len..];
    }

    if processed {
        tracing::debug!(
            messages_bytes = raw.len() - buf.len(),
            payload_bytes = out.len(),
            "stripped event-stream envelope"
        );
        Cow::Owned(out)
    } else {
        Cow::Borrowed(raw)
    }
}

/// Keep the JSON-bearing lines of one message payload.
fn extract_json_payload(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut kept = String::new();
    for line in text.split('\n') {
        let mut trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            continue;
        }
        if trimmed.starts_with("event") {
            match memchr::memchr(b'{', trimmed.as_bytes()) {
                Some(idx) => trimmed = &trimmed[idx..],
                None => continue,
            }
        }
        if is_bookkeeping_line(trimmed) {
            continue;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(trimmed);
    }
    kept
}

fn is_bookkeeping_line(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .is_ok_and(|value| is_bookkeeping_payload(&value))
}

#[cfg(test)]
pub(crate) fn encode_message(headers: &[u8], payload: &[u8]) -> Vec<u8> {
    let total = MIN_MESSAGE_LEN + headers.len() + payload.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&u32::try_from(total).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(&u32::try_from(headers.len()).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(headers);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0; 4]);
    out
}
