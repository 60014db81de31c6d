//! `SQLite`-backed session store

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sideload_errors::{Error, StorageError};
use sideload_types::{ItemId, SessionId, SessionRecord};
use sqlx::{Pool, Sqlite};
use std::path::Path;

use crate::{create_memory_pool, create_pool, queries, run_migrations, SessionStore};

/// Session store persisting to a `SQLite` database
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: Pool<Sqlite>,
    ttl: Duration,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SqliteSessionStore {
    /// Open (creating if needed) the database at `path` and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or a migration fails.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let pool = create_pool(path).await?;
        run_migrations(&pool).await?;
        tracing::debug!(path = %path.display(), ttl_hours = ttl.num_hours(), "session store opened");
        Ok(Self { pool, ttl })
    }

    /// Private in-memory store, mainly for tests
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or migrated.
    pub async fn in_memory(ttl: Duration) -> Result<Self, Error> {
        let pool = create_memory_pool().await?;
        run_migrations(&pool).await?;
        Ok(Self { pool, ttl })
    }

    /// Wrap an already migrated pool
    #[must_use]
    pub fn with_pool(pool: Pool<Sqlite>, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Oldest `created_at` still considered live
    fn cutoff_millis(&self) -> i64 {
        (Utc::now() - self.ttl).timestamp_millis()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), Error> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        if let Some(owner) = queries::item_for_session(&mut tx, record.session_id).await? {
            if owner != record.item_id.as_str() {
                return Err(StorageError::SessionConflict {
                    session_id: record.session_id.get(),
                    item: owner,
                }
                .into());
            }
        }
        queries::upsert_session(&mut tx, record).await?;

        tx.commit().await.map_err(StorageError::from)?;
        tracing::debug!(
            item = %record.item_id,
            session = %record.session_id,
            kind = %record.kind,
            "session record stored"
        );
        Ok(())
    }

    async fn get_by_item(&self, item_id: &ItemId) -> Result<Option<SessionRecord>, Error> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        queries::get_by_item(&mut conn, item_id, self.cutoff_millis()).await
    }

    async fn get_by_session_id(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionRecord>, Error> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        queries::get_by_session_id(&mut conn, session_id, self.cutoff_millis()).await
    }

    async fn delete(&self, item_id: &ItemId) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        let removed = queries::delete_by_item(&mut conn, item_id).await?;
        if removed {
            tracing::debug!(item = %item_id, "session record deleted");
        }
        Ok(removed)
    }

    async fn list_active(&self) -> Result<Vec<SessionRecord>, Error> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        queries::list_since(&mut conn, self.cutoff_millis()).await
    }

    async fn purge_expired(&self) -> Result<Vec<SessionRecord>, Error> {
        let cutoff = self.cutoff_millis();
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let expired = queries::list_before(&mut tx, cutoff).await?;
        if !expired.is_empty() {
            queries::delete_before(&mut tx, cutoff).await?;
        }

        tx.commit().await.map_err(StorageError::from)?;
        for record in &expired {
            tracing::info!(
                item = %record.item_id,
                session = %record.session_id,
                created_at = %record.created_at,
                "purged expired session record"
            );
        }
        Ok(expired)
    }
}
