//! Status transitions observed by the presentation layer

use serde::{Deserialize, Serialize};
use sideload_types::ItemId;
use std::fmt;

use crate::EventSource;

/// Kind of transition carried by a [`SyncEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    Installing,
    InstallSuccess,
    InstallFailure,
    UninstallSuccess,
    UninstallFailure,
}

impl SyncEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::InstallSuccess => "install_success",
            Self::InstallFailure => "install_failure",
            Self::UninstallSuccess => "uninstall_success",
            Self::UninstallFailure => "uninstall_failure",
        }
    }
}

impl fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient `{type, item}` message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub kind: SyncEventType,
    pub item_id: ItemId,
}

impl SyncEvent {
    pub fn new(kind: SyncEventType, item_id: impl Into<ItemId>) -> Self {
        Self {
            kind,
            item_id: item_id.into(),
        }
    }

    pub fn installing(item_id: impl Into<ItemId>) -> Self {
        Self::new(SyncEventType::Installing, item_id)
    }

    pub fn install_success(item_id: impl Into<ItemId>) -> Self {
        Self::new(SyncEventType::InstallSuccess, item_id)
    }

    pub fn install_failure(item_id: impl Into<ItemId>) -> Self {
        Self::new(SyncEventType::InstallFailure, item_id)
    }

    pub fn uninstall_success(item_id: impl Into<ItemId>) -> Self {
        Self::new(SyncEventType::UninstallSuccess, item_id)
    }

    pub fn uninstall_failure(item_id: impl Into<ItemId>) -> Self {
        Self::new(SyncEventType::UninstallFailure, item_id)
    }

    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self.kind {
            SyncEventType::UninstallSuccess | SyncEventType::UninstallFailure => {
                EventSource::UNINSTALL
            }
            _ => EventSource::INSTALL,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self.kind {
            SyncEventType::InstallFailure | SyncEventType::UninstallFailure => Level::WARN,
            SyncEventType::Installing => Level::DEBUG,
            SyncEventType::InstallSuccess | SyncEventType::UninstallSuccess => Level::INFO,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            SyncEventType::InstallFailure | SyncEventType::UninstallFailure
        )
    }

    /// Everything but `Installing` ends an operation
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind != SyncEventType::Installing
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self.kind {
            SyncEventType::UninstallSuccess | SyncEventType::UninstallFailure => {
                "sideload::events::uninstall"
            }
            _ => "sideload::events::install",
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.item_id)
    }
}
