#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::needless_raw_string_hashes, clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

//! Session state for sideload
//!
//! This crate persists the outstanding installer session records in `SQLite`
//! so they survive process restarts. One record per item; expired records
//! are invisible to every read and removed by `purge_expired`.

pub mod queries;
pub mod sqlite;
pub mod store;

pub use sqlite::SqliteSessionStore;
pub use store::SessionStore;

use sideload_errors::{Error, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

/// Create a new `SQLite` connection pool
///
/// # Errors
///
/// Returns an error if the database connection fails or configuration is invalid.
pub async fn create_pool(db_path: &Path) -> Result<Pool<Sqlite>, Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(StorageError::from)?;

    if let Ok(mut conn) = pool.acquire().await {
        let _ = sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&mut *conn)
            .await;
        let _ = sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&mut *conn)
            .await;
    }

    Ok(pool)
}

/// Create a private in-memory database.
///
/// A single connection that never idles out keeps the database alive for
/// the lifetime of the pool.
///
/// # Errors
///
/// Returns an error if the connection cannot be opened.
pub async fn create_memory_pool() -> Result<Pool<Sqlite>, Error> {
    let options = SqliteConnectOptions::new().in_memory(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| StorageError::from(e).into())
}

/// Run database migrations
///
/// # Errors
///
/// Returns an error if any migration fails to execute.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        StorageError::MigrationFailed {
            message: e.to_string(),
        }
        .into()
    })
}
