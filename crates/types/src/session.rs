//! Durable install/upgrade session records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ItemId;

/// Records older than this are treated as abandoned
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Platform-assigned opaque session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i32);

impl SessionId {
    #[must_use]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for SessionId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Whether a session installs a fresh copy or replaces an installed one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Install,
    Upgrade,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(Self::Install),
            "upgrade" => Ok(Self::Upgrade),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// The durable unit tracked per item: at most one per `item_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub item_id: ItemId,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub kind: OperationKind,
}

impl SessionRecord {
    /// Create a record stamped with the current time
    pub fn new(item_id: impl Into<ItemId>, session_id: SessionId, kind: OperationKind) -> Self {
        Self {
            item_id: item_id.into(),
            session_id,
            created_at: Utc::now(),
            kind,
        }
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// A record is expired once strictly more than `ttl` has elapsed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}
