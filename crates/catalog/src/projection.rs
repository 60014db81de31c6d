//! Read-side projection of sync events onto a snapshot

use sideload_events::{SyncEvent, SyncEventType};
use sideload_types::{ItemState, ItemStatus};

use crate::LibrarySnapshot;

/// Apply `event` to `snapshot` and return the updated copy.
///
/// Pure: never touches the store or the platform. Events for items outside
/// the snapshot leave it unchanged.
#[must_use]
pub fn apply_event(snapshot: &LibrarySnapshot, event: &SyncEvent, now_millis: i64) -> LibrarySnapshot {
    let mut next = snapshot.clone();
    next.apply(event, now_millis);
    next
}

impl LibrarySnapshot {
    /// In-place form of [`apply_event`]
    pub fn apply(&mut self, event: &SyncEvent, now_millis: i64) {
        let Some(entry) = self.get_mut(event.item_id.as_str()) else {
            return;
        };
        entry.state = transition(entry.state, event.kind, now_millis);
    }
}

fn transition(state: ItemState, kind: SyncEventType, now_millis: i64) -> ItemState {
    match kind {
        SyncEventType::Installing => {
            let status = match state.status {
                ItemStatus::Installed | ItemStatus::Upgrading => ItemStatus::Upgrading,
                ItemStatus::Uninstalled | ItemStatus::Installing => ItemStatus::Installing,
            };
            ItemState {
                status,
                update_available: false,
                ..state
            }
        }
        SyncEventType::InstallSuccess => ItemState::installed(now_millis),
        SyncEventType::InstallFailure => match state.status {
            ItemStatus::Upgrading => ItemState {
                status: ItemStatus::Installed,
                update_available: false,
                ..state
            },
            ItemStatus::Installing => ItemState::uninstalled(),
            ItemStatus::Installed | ItemStatus::Uninstalled => state,
        },
        SyncEventType::UninstallSuccess => ItemState::uninstalled(),
        SyncEventType::UninstallFailure => ItemState {
            status: ItemStatus::Installed,
            update_available: false,
            ..state
        },
    }
}
