#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Sync event bus for sideload
//!
//! Status transitions produced by the session coordinator are broadcast to
//! any number of subscribers. Delivery is at-most-once with no history: a
//! subscriber only sees events published after it subscribed, and a
//! subscriber that falls behind loses the oldest events rather than slowing
//! the publisher.

pub mod bus;
pub mod meta;
pub mod sync;

pub use bus::{Subscription, SyncEventBus, DEFAULT_BUS_CAPACITY};
pub use meta::{EventLevel, EventMeta, EventSource};
pub use sync::{SyncEvent, SyncEventType};

use serde::{Deserialize, Serialize};

/// Envelope pairing an event with its metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: SyncEvent,
}

impl EventMessage {
    #[must_use]
    pub fn new(meta: EventMeta, event: SyncEvent) -> Self {
        Self { meta, event }
    }

    /// Build a message with metadata derived from the event itself
    #[must_use]
    pub fn from_event(event: SyncEvent) -> Self {
        let meta = EventMeta::new(EventLevel::from(event.log_level()), event.event_source());
        Self { meta, event }
    }
}
