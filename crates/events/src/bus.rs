//! Broadcast bus for sync events

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, error, info, trace, warn, Level};

use crate::{EventMessage, SyncEvent};

/// Default number of undelivered events buffered per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Thin wrapper around a `broadcast::Sender<EventMessage>`.
///
/// Cloning the bus is cheap and gives each holder the ability to both
/// publish and subscribe. Owned by the runtime; dropped on teardown.
#[derive(Clone, Debug)]
pub struct SyncEventBus {
    tx: broadcast::Sender<EventMessage>,
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl SyncEventBus {
    /// Create a bus buffering at most `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers it reached;
    /// with no subscribers the event is dropped.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.publish_message(EventMessage::from_event(event))
    }

    /// Publish an event with additional metadata labels
    pub fn publish_with_labels<I, K, V>(&self, event: SyncEvent, labels: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut message = EventMessage::from_event(event);
        for (key, value) in labels {
            message.meta.labels.insert(key.into(), value.into());
        }
        self.publish_message(message)
    }

    /// Publish an event tied to a platform session; the session id becomes
    /// the correlation id alongside a `session` label
    pub fn publish_for_session<I, K, V>(
        &self,
        event: SyncEvent,
        session: impl ToString,
        labels: I,
    ) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let session = session.to_string();
        let mut message = EventMessage::from_event(event);
        message.meta = message.meta.with_correlation_id(session.clone());
        message.meta.labels.insert("session".to_string(), session);
        for (key, value) in labels {
            message.meta.labels.insert(key.into(), value.into());
        }
        self.publish_message(message)
    }

    /// Publish a prebuilt message
    pub fn publish_message(&self, message: EventMessage) -> usize {
        log_message(&message);
        // `send` fails only when nobody is subscribed.
        self.tx.send(message).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving half of the bus.
///
/// A subscriber that falls more than the bus capacity behind skips the
/// oldest events and keeps going.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<EventMessage>,
}

impl Subscription {
    /// Wait for the next event; `None` once every publisher is gone
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync event subscriber lagged, oldest events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already buffered
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync event subscriber lagged, oldest events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

fn log_message(message: &EventMessage) {
    let EventMessage { meta, event } = message;
    let target = event.log_target();
    let session = meta.correlation_id.as_deref().unwrap_or("-");
    match meta.tracing_level() {
        Level::ERROR => error!(event_target = target, item = %event.item_id, kind = %event.kind, session, labels = ?meta.labels, "sync event"),
        Level::WARN => warn!(event_target = target, item = %event.item_id, kind = %event.kind, session, labels = ?meta.labels, "sync event"),
        Level::INFO => info!(event_target = target, item = %event.item_id, kind = %event.kind, session, "sync event"),
        Level::DEBUG => debug!(event_target = target, item = %event.item_id, kind = %event.kind, session, "sync event"),
        _ => trace!(event_target = target, item = %event.item_id, kind = %event.kind, session, "sync event"),
    }
}
