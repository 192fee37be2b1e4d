//! Strict byte-level JSON scanning.
//!
//! Used to validate candidate payloads and to recover objects embedded in
//! noisy lines without building a `serde_json::Value` for every attempt.

use std::ops::Range;

#[inline]
pub(crate) fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    while i < len {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => break,
        }
    }
    i
}

#[inline]
pub(crate) fn parse_json_string_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'"' {
        return Err(());
    }
    let mut i = start + 1;
    while i < len {
        match bytes[i] {
            b'"' => return Ok(i + 1),
            b'\\' => {
                i += 1;
                if i >= len {
                    return Err(());
                }
                i += 1;
            }
            0x00..=0x1F => return Err(()),
            _ => i += 1,
        }
    }
    Err(())
}

#[inline]
pub(crate) fn parse_json_value_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let i = skip_ws(bytes, start);
    if i >= bytes.len() {
        return Err(());
    }

    match bytes[i] {
        b'"' => parse_json_string_end(bytes, i),
        b'{' => parse_json_object_end(bytes, i),
        b'[' => parse_json_array_end(bytes, i),
        b't' => consume_literal(bytes, i, b"true"),
        b'f' => consume_literal(bytes, i, b"false"),
        b'n' => consume_literal(bytes, i, b"null"),
        b'-' | b'0'..=b'9' => parse_json_number_end(bytes, i),
        _ => Err(()),
    }
}

#[inline]
fn parse_json_object_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'{' {
        return Err(());
    }
    let mut i = start + 1;
    loop {
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        match bytes[i] {
            b'}' => return Ok(i + 1),
            b'"' => {}
            _ => return Err(()),
        }

        i = parse_json_string_end(bytes, i)?;
        i = skip_ws(bytes, i);
        if i >= len || bytes[i] != b':' {
            return Err(());
        }
        i = parse_json_value_end(bytes, i + 1)?;
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        match bytes[i] {
            b',' => i += 1,
            b'}' => return Ok(i + 1),
            _ => return Err(()),
        }
    }
}

#[inline]
fn parse_json_array_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'[' {
        return Err(());
    }
    let mut i = start + 1;
    loop {
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        if bytes[i] == b']' {
            return Ok(i + 1);
        }

        i = parse_json_value_end(bytes, i)?;
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        match bytes[i] {
            b',' => i += 1,
            b']' => return Ok(i + 1),
            _ => return Err(()),
        }
    }
}

#[inline]
fn consume_literal(bytes: &[u8], start: usize, lit: &[u8]) -> Result<usize, ()> {
    let end = start.checked_add(lit.len()).ok_or(())?;
    if end <= bytes.len() && &bytes[start..end] == lit {
        Ok(end)
    } else {
        Err(())
    }
}

#[inline]
fn parse_json_number_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let len = bytes.len();
    let mut i = start;
    if i < len && bytes[i] == b'-' {
        i += 1;
    }

    if i >= len {
        return Err(());
    }
    match bytes[i] {
        b'0' => i += 1,
        b'1'..=b'9' => {
            i += 1;
            while i < len && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        _ => return Err(()),
    }

    if i < len && bytes[i] == b'.' {
        i += 1;
        if i >= len || !bytes[i].is_ascii_digit() {
            return Err(());
        }
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }

    if i < len && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if i < len && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        if i >= len || !bytes[i].is_ascii_digit() {
            return Err(());
        }
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }

    Ok(i)
}

/// `true` when `bytes` holds exactly one JSON value, surrounding whitespace allowed.
#[must_use]
pub(crate) fn is_complete_json(bytes: &[u8]) -> bool {
    match parse_json_value_end(bytes, 0) {
        Ok(end) => skip_ws(bytes, end) == bytes.len(),
        Err(()) => false,
    }
}

/// Byte ranges of the JSON objects embedded in `text`.
///
/// Single left-to-right pass: each `{` opens a candidate that is closed by the
/// matching `}` outside string literals. Only strictly valid candidates are
/// returned. A candidate that never closes ends the scan.
#[must_use]
pub(crate) fn json_object_spans(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let Some(mut start) = memchr::memchr(b'{', bytes) else {
        return objects;
    };

    loop {
        let Some(end) = matching_brace_end(bytes, start) else {
            break;
        };
        if is_complete_json(&bytes[start..end]) {
            objects.push(start..end);
        }
        match memchr::memchr(b'{', &bytes[end..]) {
            Some(rel) => start = end + rel,
            None => break,
        }
    }
    objects
}

/// End (exclusive) of the brace group opened at `start`, string and escape aware.
fn matching_brace_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
