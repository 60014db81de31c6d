//! Merged library snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;
use sideload_types::{
    InstalledPackage, Item, ItemId, ItemState, ItemStatus, OperationKind, SessionId,
    SessionRecord, UpdateSettings,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::Catalog;

/// One item with its derived state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEntry {
    pub item: Item,
    pub state: ItemState,
}

/// Library view keyed by item id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LibrarySnapshot {
    entries: BTreeMap<ItemId, LibraryEntry>,
}

impl LibrarySnapshot {
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = LibraryEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.item.id.clone(), entry))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LibraryEntry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut LibraryEntry> {
        self.entries.get_mut(id)
    }

    /// Status of `id`, `None` if it is not in the catalog
    #[must_use]
    pub fn status(&self, id: &str) -> Option<ItemStatus> {
        self.entries.get(id).map(|entry| entry.state.status)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.values()
    }

    /// Items that are installed and older than the staleness threshold
    pub fn updates_available(&self) -> impl Iterator<Item = &Item> {
        self.entries
            .values()
            .filter(|entry| entry.state.update_available)
            .map(|entry| &entry.item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive every item's state.
///
/// An item is `Installing`/`Upgrading` only while it has a live record whose
/// platform session is still active; the record's kind tells the two apart.
/// Otherwise it is `Installed` when the platform reports it, `Uninstalled`
/// if not. `update_available` requires `Installed` and an enabled staleness
/// threshold that has been exceeded.
#[must_use]
pub fn merge(
    catalog: &Catalog,
    installed: &BTreeMap<String, InstalledPackage>,
    records: &[SessionRecord],
    active_sessions: &BTreeSet<SessionId>,
    settings: UpdateSettings,
    now: DateTime<Utc>,
) -> LibrarySnapshot {
    let in_flight: BTreeMap<&ItemId, OperationKind> = records
        .iter()
        .filter(|record| active_sessions.contains(&record.session_id))
        .map(|record| (&record.item_id, record.kind))
        .collect();

    LibrarySnapshot::from_entries(catalog.items().map(|item| {
        let package = installed.get(item.id.as_str());
        let last_update = package.map_or(ItemState::NEVER_INSTALLED, |p| p.last_update_millis);

        let state = match (in_flight.get(&item.id), package) {
            (Some(OperationKind::Install), _) => ItemState {
                status: ItemStatus::Installing,
                last_update_timestamp: last_update,
                update_available: false,
            },
            (Some(OperationKind::Upgrade), _) => ItemState {
                status: ItemStatus::Upgrading,
                last_update_timestamp: last_update,
                update_available: false,
            },
            (None, Some(package)) => ItemState {
                status: ItemStatus::Installed,
                last_update_timestamp: package.last_update_millis,
                update_available: settings.is_stale(package.last_update_millis, now),
            },
            (None, None) => ItemState::uninstalled(),
        };

        LibraryEntry {
            item: item.clone(),
            state,
        }
    }))
}
