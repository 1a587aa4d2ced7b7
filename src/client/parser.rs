//! Incremental parser for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; the parser buffers them and emits an
//! event each time a complete frame (terminated by a blank line) is available.
//!
//! # Parsing Flow
//!
//! 1. **WaitingForFrame**: buffer is empty
//! 2. **PartialFrame**: bytes buffered, no blank line seen yet
//! 3. On a blank line the frame's `event:` and `data:` fields are collected and
//!    the parser returns to one of the states above
//!
//! Comment lines (`: keep-alive`) and unknown fields are ignored. A frame without
//! an `event:` field is named `message`. Several `data:` lines are joined with `\n`.
//!
//! # Examples
//!
//! ```ignore
//! use canopy_axum_http::client::EventParser;
//!
//! let mut parser = EventParser::new();
//! assert!(parser.feed(b"event: created\nda")?.is_empty());
//! let events = parser.feed(b"ta: {}\n\n")?;
//! assert_eq!(events[0].event, "created");
//! ```

use crate::error::Result;
use crate::protocol::ServerSentEvent;
use bytes::BytesMut;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Parse state for the event-stream parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// No buffered bytes
    WaitingForFrame,
    /// Part of a frame is buffered
    PartialFrame,
}

/// Event-stream parser.
#[derive(Debug)]
pub struct EventParser {
    buffer: BytesMut,
    state: ParseState,
}

impl EventParser {
    /// Parser with an empty buffer.
    pub fn new() -> Self {
        EventParser {
            buffer: BytesMut::with_capacity(4096),
            state: ParseState::WaitingForFrame,
        }
    }

    /// Feed bytes and return every event they complete.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<ServerSentEvent>> {
        self.buffer.extend_from_slice(data);
        let mut events = Vec::new();

        while let Some((end, sep_len)) = self.find_frame_end() {
            let frame = self.buffer.split_to(end + sep_len);
            let text = String::from_utf8(frame[..end].to_vec())?;
            if let Some(event) = parse_frame(&text) {
                events.push(event);
            }
        }

        self.state = if self.buffer.is_empty() {
            ParseState::WaitingForFrame
        } else {
            ParseState::PartialFrame
        };
        Ok(events)
    }

    /// Position and length of the first blank-line separator.
    fn find_frame_end(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
        let crlf = self
            .buffer
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|p| (p, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// Whether a frame is half read.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes of the frame currently being assembled.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_frame(frame: &str) -> Option<ServerSentEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(ServerSentEvent {
        event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data: data.join("\n"),
    })
}
