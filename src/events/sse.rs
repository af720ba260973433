//! Incremental decoder for the text/event-stream wire format.
//!
//! The daemon frames every event as standard SSE: `event:`/`data:`/`id:`/
//! `retry:` fields, comment lines starting with `:`, and a blank line ending
//! each message. Input arrives in arbitrary byte chunks from the HTTP body,
//! so the decoder keeps partial lines across feeds.

use std::time::Duration;

/// One decoded server-sent event message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SseMessage {
    /// Event name; `message` when the server sent no `event:` field.
    pub event: String,
    /// Payload; multiple `data:` lines are joined with `\n`.
    pub data: String,
    /// Last seen `id:` value at the time this message was dispatched.
    pub id: Option<String>,
}

/// Streaming SSE decoder.
///
/// Feed raw body chunks with [`SseDecoder::feed`]; completed messages come
/// back in wire order. The decoder tracks the stream's last event id (for the
/// `Last-Event-ID` reconnect header) and the most recent `retry:` hint.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
    last_event_id: Option<String>,
    retry_hint: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk of the response body and returns every message
    /// completed by it.
    ///
    /// Chunk boundaries can fall anywhere, including inside a multi-byte
    /// UTF-8 character, so bytes are buffered raw and only complete lines are
    /// converted. Invalid UTF-8 within a complete line is replaced rather
    /// than failing the stream; the daemon only emits UTF-8 JSON.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop(); // trailing '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.consume_line(&line) {
                messages.push(message);
            }
        }
        messages
    }

    /// Last `id:` value seen on the stream, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Most recent server `retry:` reconnect hint, if any.
    pub fn retry_hint(&self) -> Option<Duration> {
        self.retry_hint
    }

    fn consume_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment; servers use these as keep-alives.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" => {
                // An id containing NUL must be ignored; keep the old one.
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry_hint = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            // Blank line without data resets the event name and emits nothing.
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();

        Some(SseMessage {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_event_id.clone(),
        })
    }
}
