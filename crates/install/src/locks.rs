//! Per-item serialisation

use dashmap::DashMap;
use sideload_types::ItemId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per item, created on first use.
///
/// Transitions for the same item run one at a time; different items never
/// contend.
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: DashMap<ItemId, Arc<Mutex<()>>>,
}

impl ItemLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `item`
    pub async fn lock(&self, item: &ItemId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so no map shard stays borrowed across the await.
        let mutex = self.locks.entry(item.clone()).or_default().clone();
        mutex.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
