// shared/src/types/sse.rs
// SSE wire codec - framing on the server side, incremental parsing on the client side

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Longest line the decoder will hold, in bytes.
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
    /// Server's suggested reconnect delay in milliseconds, if it sent one.
    pub retry: Option<u64>,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum SseError {
    #[error("Failed to broadcast event: {0}")]
    ChannelSendFailed(String),
    #[error("SSE line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

pub type SseResult<T> = Result<T, SseError>;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialise a named event carrying JSON data into the SSE wire format.
pub fn format_event(event_type: &str, data: &Value) -> String {
    let data_str = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
    format!(
        "event: {}\ndata: {}\nid: {}\n\n",
        event_type,
        data_str,
        Uuid::new_v4()
    )
}

/// A comment frame. Clients ignore it; it keeps idle connections warm.
pub fn format_comment(text: &str) -> String {
    format!(": {}\n\n", text)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Incremental SSE parser.
///
/// Feed it body chunks as they arrive, in any split; complete frames come
/// back in order. Partial lines (including split UTF-8 sequences) are held
/// until the rest arrives, up to a line length limit.
#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    max_line: usize,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            event: None,
            data: Vec::new(),
            id: None,
            retry: None,
        }
    }

    /// Decode the frames completed by `chunk`. A line longer than the limit
    /// fails the whole stream; the decoder is unusable afterwards.
    pub fn feed(&mut self, chunk: &[u8]) -> SseResult<Vec<SseFrame>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            if pos > self.max_line {
                return Err(self.overflow());
            }
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        if self.buf.len() > self.max_line {
            return Err(self.overflow());
        }
        Ok(frames)
    }

    fn overflow(&mut self) -> SseError {
        self.buf = Vec::new();
        SseError::LineTooLong {
            limit: self.max_line,
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => self.retry = value.parse().ok(),
            other => debug!("Ignoring unknown SSE field: {}", other),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        let retry = self.retry.take();

        if self.data.is_empty() {
            return None;
        }

        Some(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
            id,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: notif").unwrap().is_empty());
        assert!(decoder.feed(b"ication\ndata: {\"id\"").unwrap().is_empty());
        let frames = decoder.feed(b":\"n1\"}\n\n").unwrap();
        assert_eq!(frames, vec![SseFrame::new("notification", r#"{"id":"n1"}"#)]);
    }

    #[test]
    fn crlf_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: first\r\ndata: second\r\n\r\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, DEFAULT_EVENT);
        assert_eq!(frames[0].data, "first\nsecond");
    }

    #[test]
    fn comments_and_empty_frames_are_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\n\nevent: connected\n\n").unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn retry_and_id_are_captured() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"id: 7\nretry: 2500\nevent: broadcast\ndata:{}\n\n").unwrap();
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].retry, Some(2500));
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn split_utf8_sequence_is_reassembled() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: café\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        assert!(decoder.feed(head).unwrap().is_empty());
        let frames = decoder.feed(tail).unwrap();
        assert_eq!(frames[0].data, "café");
    }

    #[test]
    fn formatted_event_decodes_back() {
        let wire = format_event("notification_deleted", &serde_json::json!({"id": "n9"}));
        let frames = SseDecoder::new().feed(wire.as_bytes()).unwrap();
        assert_eq!(frames[0].event, "notification_deleted");
        assert_eq!(frames[0].data, r#"{"id":"n9"}"#);
        assert!(frames[0].id.is_some());
    }

    #[test]
    fn endless_line_is_rejected() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert!(decoder.feed(b"data: 0123456789").unwrap().is_empty());
        assert!(matches!(
            decoder.feed(b"abcdef"),
            Err(SseError::LineTooLong { limit: 16 })
        ));
    }

    #[test]
    fn long_line_within_one_chunk_is_rejected() {
        let mut decoder = SseDecoder::with_max_line(16);
        let err = decoder.feed(b"data: 0123456789abcdef\n\n").unwrap_err();
        assert!(matches!(err, SseError::LineTooLong { limit: 16 }));
    }

    #[test]
    fn lines_at_the_limit_still_decode() {
        let mut decoder = SseDecoder::with_max_line(16);
        let frames = decoder.feed(b"data: 0123456789\n\n").unwrap();
        assert_eq!(frames[0].data, "0123456789");
    }
}
