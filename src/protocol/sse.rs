//! Server-Sent-Event framing.
//!
//! Each event is written as
//!
//! ```text
//! event: <name>\n
//! data: <single-line data>\n
//! \n
//! ```
//!
//! Line breaks inside `data` are folded into single spaces so that every event
//! occupies exactly one `data:` line. Event names may not contain line breaks.

use bytes::Bytes;
use serde::Serialize;

/// MIME type of an event stream.
pub const CONTENT_TYPE: &str = "text/event-stream";

/// One named event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSentEvent {
    /// Event name (`event:` field).
    pub event: String,
    /// Payload (`data:` field).
    pub data: String,
}

impl ServerSentEvent {
    /// Create an event.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: single_line(&event.into()),
            data: single_line(&data.into()),
        }
    }

    /// Create an event whose data is the JSON encoding of `value`.
    pub fn json<T: Serialize>(event: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(event, serde_json::to_string(value)?))
    }

    /// Encode as a wire frame.
    pub fn to_frame(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, self.data))
    }
}

fn single_line(value: &str) -> String {
    if !value.contains(['\n', '\r']) {
        return value.to_string();
    }
    value
        .split(['\n', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format() {
        let event = ServerSentEvent::new("tick", "42");
        assert_eq!(event.to_frame(), Bytes::from_static(b"event: tick\ndata: 42\n\n"));
    }

    #[test]
    fn test_multiline_data_is_folded() {
        let event = ServerSentEvent::new("msg", "line one\r\nline two\n");
        assert_eq!(event.data, "line one line two");
    }

    #[test]
    fn test_json_event() {
        let event = ServerSentEvent::json("album", &serde_json::json!({"title": "X"})).unwrap();
        assert_eq!(event.data, r#"{"title":"X"}"#);
    }
}
