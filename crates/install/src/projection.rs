//! Read-side library projection fed by sync events

use sideload_catalog::LibrarySnapshot;
use sideload_events::{Subscription, SyncEvent};
use sideload_types::now_millis;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Latest library view, updated by full refreshes and by each sync event
#[derive(Debug, Clone)]
pub struct LibraryProjection {
    tx: Arc<watch::Sender<LibrarySnapshot>>,
}

impl LibraryProjection {
    #[must_use]
    pub fn new(initial: LibrarySnapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> LibrarySnapshot {
        self.tx.borrow().clone()
    }

    /// Swap in a freshly computed snapshot
    pub fn replace(&self, snapshot: LibrarySnapshot) {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    pub fn apply(&self, event: &SyncEvent) {
        self.tx.send_modify(|snapshot| snapshot.apply(event, now_millis()));
    }

    /// Apply every event received on `events` until the bus closes
    pub fn spawn(&self, mut events: Subscription) -> JoinHandle<()> {
        let projection = self.clone();
        tokio::spawn(async move {
            while let Some(message) = events.recv().await {
                projection.apply(&message.event);
            }
            tracing::debug!("event bus closed, projection stopped");
        })
    }
}
