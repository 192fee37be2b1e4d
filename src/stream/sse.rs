//! SSE splitting for buffered upstream bodies.
//!
//! `event:` names the next frame, `data:` lines accumulate into it and a
//! blank line dispatches it. Unlike strict SSE, an unprefixed line also
//! counts as data: the upstream's older wire format writes one JSON object
//! per line with no `data:` prefix and no blank-line separators.

use memchr::memchr_iter;

use super::SseEvent;

/// Terminal frame of an `OpenAI` chunk stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Default)]
struct FrameBuilder {
    event: Option<String>,
    data: String,
    has_data: bool,
    out: Vec<SseEvent>,
}

impl FrameBuilder {
    fn line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') || line.starts_with("retry:") || line.starts_with("id:") {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            self.push_data(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim().to_string());
        } else {
            self.push_data(line);
        }
    }

    fn push_data(&mut self, value: &str) {
        if self.has_data {
            self.data.push('\n');
        }
        self.has_data = true;
        self.data.push_str(value);
    }

    fn dispatch(&mut self) {
        if !self.has_data {
            return;
        }
        self.out.push(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data),
        });
        self.has_data = false;
    }
}

/// Split a complete body into frames, flushing the unterminated tail.
#[must_use]
pub fn split_sse_frames(body: &str) -> Vec<SseEvent> {
    let mut builder = FrameBuilder::default();
    let mut start = 0;
    for end in memchr_iter(b'\n', body.as_bytes()) {
        builder.line(&body[start..end]);
        start = end + 1;
    }
    if start < body.len() {
        builder.line(&body[start..]);
    }
    builder.dispatch();
    builder.out
}

/// Whether `event` is the `[DONE]` terminator.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event() {
        let events = split_sse_frames("event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, "{\"type\":\"message_start\"}");
    }

    #[test]
    fn test_multiline_data() {
        let events = split_sse_frames("data: line1\ndata: line2\ndata:line3\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2\nline3");
    }

    #[test]
    fn test_comments_retry_and_ids_are_skipped() {
        let events = split_sse_frames(": keep-alive\nretry: 100\nid: 7\r\ndata: hello\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_bare_lines_join_one_frame() {
        let events = split_sse_frames("{\"content\":\"a\"}\n{\"content\":\"b\"}");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"content\":\"a\"}\n{\"content\":\"b\"}");
    }

    #[test]
    fn test_unterminated_frame_is_flushed() {
        let events = split_sse_frames("data: first\n\nevent: last\ndata: second");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, None);
        assert_eq!(events[1].event.as_deref(), Some("last"));
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn test_done_event_detection() {
        let events = split_sse_frames("data: [DONE]\n\n");
        assert!(is_done_event(&events[0]));
        assert_eq!(split_sse_frames(DONE_FRAME), events);
    }
}
