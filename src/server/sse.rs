//! Server-sent event responses backed by a broadcast subscription.
//!
//! Each response owns one [`Subscription`]. A delivery task forwards events
//! into the response body and stops as soon as either side goes away:
//!
//! - the hub closes or removes the subscriber (the subscription ends);
//! - the client disconnects (the body channel closes).
//!
//! Dropping the task drops the subscription, which unsubscribes it.

use super::broadcast::{BroadcastHub, Subscription};
use crate::protocol::sse::{self, ServerSentEvent};
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Frames buffered between the delivery task and the socket.
const BODY_BUFFER: usize = 16;

/// Streaming `text/event-stream` response.
pub struct EventStreamResponse {
    subscription: Subscription<ServerSentEvent>,
}

impl EventStreamResponse {
    /// Stream what `subscription` receives.
    pub fn new(subscription: Subscription<ServerSentEvent>) -> Self {
        Self { subscription }
    }

    /// Subscribe to `hub` and stream what it publishes.
    pub fn from_hub(hub: &BroadcastHub<ServerSentEvent>) -> Self {
        Self::new(hub.subscribe())
    }
}

impl IntoResponse for EventStreamResponse {
    fn into_response(self) -> Response {
        let mut subscription = self.subscription;
        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(BODY_BUFFER);
        let subscriber = subscription.id();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        tracing::debug!(subscriber, "event stream client went away");
                        break;
                    }
                    event = subscription.recv() => {
                        let Some(event) = event else {
                            tracing::debug!(subscriber, "event stream ended by hub");
                            break;
                        };
                        if tx.send(Ok(event.to_frame())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(sse::CONTENT_TYPE));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        response
    }
}
