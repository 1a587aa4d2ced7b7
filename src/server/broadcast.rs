//! Broadcast hub: fan one event source out to many subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a slow
//! subscriber: if its queue is full the event is dropped for that subscriber
//! alone and a warning is logged, while everyone else keeps receiving in order.
//!
//! # Lifecycle
//!
//! | State | Entered by | Accepts subscribers | Pump task |
//! |-------|------------|---------------------|-----------|
//! | `Created` | [`BroadcastHub::new`] | yes | not running |
//! | `Running` | [`BroadcastHub::spawn`] | yes | forwards the input channel |
//! | `Closed` | [`BroadcastHub::close`] | no (streams end at once) | stopped |
//!
//! Events can be published directly with [`BroadcastHub::publish`] in any
//! state but `Closed`, or pushed into the single input channel obtained from
//! [`BroadcastHub::sender`], which the pump drains once the hub is started.
//!
//! # Examples
//!
//! ```ignore
//! use canopy_axum_http::server::BroadcastHub;
//!
//! let hub = BroadcastHub::<String>::new();
//! let mut sub = hub.subscribe();
//! hub.publish("hello".to_string());
//! assert_eq!(sub.recv().await.as_deref(), Some("hello"));
//! ```

use futures::Stream;
use parking_lot::{Mutex, RwLock};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Default per-subscriber queue length.
pub const DEFAULT_CAPACITY: usize = 64;

/// Lifecycle state of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    /// Accepting subscribers; the pump is not running yet.
    Created,
    /// Forwarding the input channel to subscribers.
    Running,
    /// Every subscriber was dropped. Terminal.
    Closed,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was queued for.
    pub delivered: usize,
    /// Subscribers that missed the event because their queue was full.
    pub dropped: usize,
}

/// Object-safe control surface, used by the server to shut hubs down.
pub trait HubControl: Send + Sync {
    /// Start forwarding the input channel. A no-op unless `Created`.
    fn start(&self);

    /// Close the hub and end every subscription.
    fn close(&self);

    fn state(&self) -> HubState;
}

struct HubInner<E> {
    subscribers: RwLock<Vec<(u64, mpsc::Sender<E>)>>,
    next_id: AtomicU64,
    state: Mutex<HubState>,
    capacity: usize,
    input_tx: mpsc::Sender<E>,
    input_rx: Mutex<Option<mpsc::Receiver<E>>>,
    shutdown: Arc<Notify>,
}

impl<E: Clone + Send + 'static> HubInner<E> {
    fn publish(&self, event: E) -> PublishReport {
        let mut report = PublishReport::default();
        let subscribers = self.subscribers.read();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = id, "subscriber queue full, dropping event");
                    report.dropped += 1;
                }
                // Receiver is gone; its Drop is about to unsubscribe.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        report
    }
}

impl<E> HubInner<E> {
    fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }
}

/// A shareable fan-out hub. Clones refer to the same hub.
pub struct BroadcastHub<E> {
    inner: Arc<HubInner<E>>,
}

impl<E: Clone + Send + Sync + 'static> BroadcastHub<E> {
    /// Create a hub with the default per-subscriber capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub whose subscribers buffer up to `capacity` events each.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (input_tx, input_rx) = mpsc::channel(capacity);
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                state: Mutex::new(HubState::Created),
                capacity,
                input_tx,
                input_rx: Mutex::new(Some(input_rx)),
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    /// Sender side of the hub's single input channel.
    pub fn sender(&self) -> mpsc::Sender<E> {
        self.inner.input_tx.clone()
    }

    /// Spawn the pump that forwards the input channel to subscribers.
    ///
    /// Returns `None` if the hub was already started or closed. Must be called
    /// from within a Tokio runtime.
    pub fn spawn(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = self.inner.state.lock();
            if *state != HubState::Created {
                return None;
            }
            *state = HubState::Running;
        }
        let mut rx = self.inner.input_rx.lock().take()?;
        let hub: Weak<HubInner<E>> = Arc::downgrade(&self.inner);
        let shutdown = Arc::clone(&self.inner.shutdown);

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    event = rx.recv() => {
                        let (Some(event), Some(inner)) = (event, hub.upgrade()) else { break };
                        inner.publish(event);
                    }
                }
            }
            tracing::debug!("broadcast pump stopped");
        }))
    }

    /// Register a new subscriber.
    ///
    /// Subscribing to a closed hub yields a subscription that ends immediately.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        // Hold the state lock so close() cannot slip in between check and insert.
        let state = self.inner.state.lock();
        if *state != HubState::Closed {
            self.inner.subscribers.write().push((id, tx));
            tracing::debug!(subscriber = id, "subscribed");
        }
        drop(state);

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Removing an unknown or already removed id is a no-op.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: E) -> PublishReport {
        if *self.inner.state.lock() == HubState::Closed {
            return PublishReport::default();
        }
        self.inner.publish(event)
    }

    /// Close the hub. Every subscriber's stream ends once drained.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == HubState::Closed {
                return;
            }
            *state = HubState::Closed;
        }
        let removed = std::mem::take(&mut *self.inner.subscribers.write());
        tracing::debug!(subscribers = removed.len(), "broadcast hub closed");
        drop(removed);
        self.inner.shutdown.notify_one();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HubState {
        *self.inner.state.lock()
    }

    /// Subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl<E: Clone + Send + Sync + 'static> HubControl for BroadcastHub<E> {
    fn start(&self) {
        if self.spawn().is_some() {
            tracing::debug!("broadcast hub started");
        }
    }

    fn close(&self) {
        BroadcastHub::close(self);
    }

    fn state(&self) -> HubState {
        BroadcastHub::state(self)
    }
}

impl<E> Clone for BroadcastHub<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Send + Sync + 'static> Default for BroadcastHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's receiving end. Dropping it unsubscribes.
pub struct Subscription<E> {
    id: u64,
    rx: mpsc::Receiver<E>,
    hub: Weak<HubInner<E>>,
}

impl<E> Subscription<E> {
    /// Handle for [`BroadcastHub::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the hub is closed or this subscriber was removed.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.rx.poll_recv(cx)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
