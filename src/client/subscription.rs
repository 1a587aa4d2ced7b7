//! Client side of server-sent event streams.
//!
//! [`EventStream`] yields the events of one open `text/event-stream`
//! response. A background task reads the body, feeds an
//! [`EventParser`](super::EventParser) and forwards complete events through a
//! channel; dropping the stream aborts the task and closes the connection.
//!
//! # Examples
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut events = albums.events("/events", &[artist_id]).await?;
//! while let Some(event) = events.next().await {
//!     let event = event?;
//!     println!("{}: {}", event.event, event.data);
//! }
//! ```

use super::parser::EventParser;
use crate::error::{CanopyError, Result};
use crate::protocol::ServerSentEvent;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_SIZE: usize = 64;

/// A stream of server-sent events.
///
/// Yields `Err` once if the connection fails or the server sends malformed
/// data, then ends. Ends without error when the server closes the stream.
pub struct EventStream {
    receiver: mpsc::Receiver<Result<ServerSentEvent>>,
    reader: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Wrap an existing channel, e.g. for tests.
    pub fn new(receiver: mpsc::Receiver<Result<ServerSentEvent>>) -> Self {
        EventStream {
            receiver,
            reader: None,
        }
    }

    /// Start reading `response`'s body in the background.
    pub(crate) fn spawn(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
        let reader = tokio::spawn(async move {
            let mut parser = EventParser::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let events = match chunk {
                    Ok(bytes) => parser.feed(&bytes),
                    Err(err) => Err(CanopyError::from(err)),
                };
                match events {
                    Ok(events) => {
                        for event in events {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
            tracing::debug!("event stream closed by server");
        });
        EventStream {
            receiver: rx,
            reader: Some(reader),
        }
    }

    /// Receive the next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<Result<ServerSentEvent>> {
        self.receiver.recv().await
    }
}

impl Stream for EventStream {
    type Item = Result<ServerSentEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
