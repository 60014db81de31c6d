//! Catalog items and their derived library state

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable identifier of an installable item (reverse-domain package name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A catalog entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(rename = "label")]
    pub display_label: String,
    pub publisher: String,
    #[serde(default, rename = "icon")]
    pub icon_ref: String,
}

impl Item {
    pub fn new(
        id: impl Into<ItemId>,
        display_label: impl Into<String>,
        publisher: impl Into<String>,
        icon_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_label: display_label.into(),
            publisher: publisher.into(),
            icon_ref: icon_ref.into(),
        }
    }
}

/// Lifecycle status of an item as presented in the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Uninstalled,
    Installing,
    Installed,
    Upgrading,
}

impl ItemStatus {
    /// `Installing` and `Upgrading` always have a session record behind them.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Installing | Self::Upgrading)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Upgrading => "upgrading",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, never persisted view of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemState {
    pub status: ItemStatus,
    /// Epoch millis of the last install/upgrade, `-1` if never installed
    pub last_update_timestamp: i64,
    pub update_available: bool,
}

impl ItemState {
    pub const NEVER_INSTALLED: i64 = -1;

    #[must_use]
    pub fn uninstalled() -> Self {
        Self {
            status: ItemStatus::Uninstalled,
            last_update_timestamp: Self::NEVER_INSTALLED,
            update_available: false,
        }
    }

    #[must_use]
    pub fn installed(last_update_timestamp: i64) -> Self {
        Self {
            status: ItemStatus::Installed,
            last_update_timestamp,
            update_available: false,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }
}

impl Default for ItemState {
    fn default() -> Self {
        Self::uninstalled()
    }
}
