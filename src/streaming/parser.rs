//! Incremental framing for streamed provider responses
//!
//! Network reads split payloads at arbitrary byte offsets. These parsers
//! buffer partial input and hand back only complete frames:
//! - `LineParser`: newline-delimited frames (NDJSON)
//! - `SseParser`: server-sent events, returning each event's `data` payload
//!
//! Both bound their buffer to `MAX_BUFFER_SIZE` of unterminated input.

use crate::errors::{ChatError, Result};

/// Maximum unterminated input held in a buffer (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Newline-delimited frame parser
#[derive(Debug)]
pub struct LineParser {
    /// Bytes after the last newline seen
    buffer: Vec<u8>,

    /// Maximum buffer size
    max_buffer_size: usize,
}

impl LineParser {
    /// Create new line parser with default settings
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Add bytes and return every line they complete.
    ///
    /// Lines are returned without their terminator (`\n` or `\r\n`); empty
    /// lines are returned as empty strings. Splitting on the newline byte
    /// never cuts a multi-byte UTF-8 sequence.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if self.buffer.len() > self.max_buffer_size {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(ChatError::MalformedProviderResponse(format!(
                "Buffer overflow: {} bytes without a line break exceeds maximum {}",
                size, self.max_buffer_size
            )));
        }

        Ok(lines)
    }

    /// Take whatever is left after the stream ends
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).trim_end_matches('\r').to_string();
        self.buffer.clear();
        Some(rest)
    }

    /// Get current buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-sent events parser
///
/// Collects `data:` fields until a blank line dispatches the event.
/// Comments (`:`) and other fields (`event:`, `id:`, `retry:`) are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    lines: LineParser,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes and return the data payload of every completed event
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        let mut events = Vec::new();
        for line in self.lines.add_bytes(bytes)? {
            if let Some(data) = self.push_line(&line) {
                events.push(data);
            }
        }
        Ok(events)
    }

    /// Dispatch a trailing event that was not followed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        if let Some(line) = self.lines.finish() {
            if let Some(data) = self.push_line(&line) {
                return Some(data);
            }
        }
        self.dispatch()
    }

    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut parser = LineParser::new();
        let lines = parser.add_bytes(b"{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert!(parser.is_empty());
    }

    #[test]
    fn test_incremental_lines() {
        let mut parser = LineParser::new();
        assert!(parser.add_bytes(br#"{"message":"#).unwrap().is_empty());
        assert!(parser.buffer_size() > 0);

        let lines = parser.add_bytes(b"\"hi\"}\r\n{\"nex").unwrap();
        assert_eq!(lines, vec![r#"{"message":"hi"}"#]);
        assert_eq!(parser.finish().as_deref(), Some(r#"{"nex"#));
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_multibyte_split_across_reads() {
        let mut parser = LineParser::new();
        let text = "héllo 世界\n".as_bytes();
        let (a, b) = text.split_at(2);
        assert!(parser.add_bytes(a).unwrap().is_empty());
        assert_eq!(parser.add_bytes(b).unwrap(), vec!["héllo 世界"]);
    }

    #[test]
    fn test_buffer_overflow() {
        let mut parser = LineParser::with_capacity(100);
        let result = parser.add_bytes(&vec![b'a'; 150]);
        assert!(matches!(result, Err(ChatError::MalformedProviderResponse(_))));
        assert!(parser.is_empty());
    }

    #[test]
    fn test_overflow_only_counts_unterminated_input() {
        let mut parser = LineParser::with_capacity(10);
        let mut data = vec![b'a'; 50];
        data.push(b'\n');
        assert_eq!(parser.add_bytes(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_sse_events() {
        let mut parser = SseParser::new();
        let events = parser
            .add_bytes(b"data: {\"x\":1}\n\n: keep-alive\n\ndata: [DONE]\n\n")
            .unwrap();
        assert_eq!(events, vec![r#"{"x":1}"#, "[DONE]"]);
    }

    #[test]
    fn test_sse_split_event_and_fields() {
        let mut parser = SseParser::new();
        assert!(parser.add_bytes(b"event: message\nid: 7\ndata:").unwrap().is_empty());
        let events = parser.add_bytes(b"one\ndata: two\r\n\r\n").unwrap();
        assert_eq!(events, vec!["one\ntwo"]);
    }

    #[test]
    fn test_sse_trailing_event_on_finish() {
        let mut parser = SseParser::new();
        assert!(parser.add_bytes(b"data: last").unwrap().is_empty());
        assert_eq!(parser.finish().as_deref(), Some("last"));
        assert!(parser.finish().is_none());
    }
}
