//! # SSE Decoder
//!
//! Incremental Server-Sent-Events decoder for change streams:
//! - Line buffering across arbitrarily split chunks (`\n` or `\r\n`)
//! - `event:` / `data:` accumulation, dispatched on a blank line
//! - `id:` tracked as the last event id (kept across reconnects)
//! - `retry:` tracked as the reconnect hint, never dispatched
//! - `:` comment lines (padding, keep-alives) skipped
//!
//! A frame is dispatched when it carried an `event:` or `data:` field, even if
//! the data is empty: `onChange` and `subscribed` carry no payload.

use std::time::Duration;

use bytes::BytesMut;

/// Event type assumed when a frame has no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// One dispatched SSE frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if the frame had one.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id in effect when the frame was dispatched.
    pub id: Option<String>,
}

impl SseFrame {
    /// Event type, defaulting to `message`.
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT_NAME)
    }
}

/// Stateful decoder fed with raw body chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    has_fields: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl FrameDecoder {
    /// Decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Latest `retry:` hint seen on this decoder.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Most recent `id:` seen, sent back as `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Drop any partially received frame before reading a new body.
    ///
    /// The retry hint and last event id survive.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.event = None;
        self.data.clear();
        self.has_fields = false;
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
            "event" => {
                self.event = Some(value.to_string());
                self.has_fields = true;
            }
            "data" => {
                self.data.push(value.to_string());
                self.has_fields = true;
            }
            "id" if !value.contains('\0') => {
                self.last_event_id = Some(value.to_string());
            }
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        if !std::mem::take(&mut self.has_fields) {
            return None;
        }
        Some(SseFrame {
            event,
            data,
            id: self.last_event_id.clone(),
        })
    }
}
