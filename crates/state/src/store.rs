//! Storage contract for session records

use async_trait::async_trait;
use sideload_errors::Error;
use sideload_types::{ItemId, SessionId, SessionRecord};

/// Durable mapping from item to its outstanding session.
///
/// Implementations never return expired records from reads. All writes go
/// through the session coordinator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert by item; replaces any existing record for the same item.
    ///
    /// Fails with `StorageError::SessionConflict` if the session id is
    /// already tracked for a different item.
    async fn put(&self, record: &SessionRecord) -> Result<(), Error>;

    async fn get_by_item(&self, item_id: &ItemId) -> Result<Option<SessionRecord>, Error>;

    /// Reverse lookup used when a callback only carries the session id
    async fn get_by_session_id(&self, session_id: SessionId)
        -> Result<Option<SessionRecord>, Error>;

    /// Idempotent; returns whether a record was removed
    async fn delete(&self, item_id: &ItemId) -> Result<bool, Error>;

    async fn list_active(&self) -> Result<Vec<SessionRecord>, Error>;

    /// Remove expired records and return what was removed
    async fn purge_expired(&self) -> Result<Vec<SessionRecord>, Error>;
}
