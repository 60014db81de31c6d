//! Runtime SQL queries for session records

use chrono::{DateTime, Utc};
use sideload_errors::{Error, StorageError};
use sideload_types::{ItemId, OperationKind, SessionId, SessionRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::{query, Row, SqliteConnection};

const COLUMNS: &str = "item_id, session_id, created_at, kind";

/// Insert or replace the record for `record.item_id`
pub async fn upsert_session(
    conn: &mut SqliteConnection,
    record: &SessionRecord,
) -> Result<(), Error> {
    query(
        "INSERT INTO install_sessions (item_id, session_id, created_at, kind)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(item_id) DO UPDATE SET
             session_id = excluded.session_id,
             created_at = excluded.created_at,
             kind = excluded.kind",
    )
    .bind(record.item_id.as_str())
    .bind(record.session_id.get())
    .bind(record.created_at.timestamp_millis())
    .bind(record.kind.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Item currently holding `session_id`, if any
pub async fn item_for_session(
    conn: &mut SqliteConnection,
    session_id: SessionId,
) -> Result<Option<String>, Error> {
    let row = query("SELECT item_id FROM install_sessions WHERE session_id = ?1")
        .bind(session_id.get())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|r| r.get("item_id")))
}

pub async fn get_by_item(
    conn: &mut SqliteConnection,
    item_id: &ItemId,
    cutoff_millis: i64,
) -> Result<Option<SessionRecord>, Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM install_sessions WHERE item_id = ?1 AND created_at >= ?2"
    );
    let row = query(&sql)
        .bind(item_id.as_str())
        .bind(cutoff_millis)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(decode_record).transpose()
}

pub async fn get_by_session_id(
    conn: &mut SqliteConnection,
    session_id: SessionId,
    cutoff_millis: i64,
) -> Result<Option<SessionRecord>, Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM install_sessions WHERE session_id = ?1 AND created_at >= ?2"
    );
    let row = query(&sql)
        .bind(session_id.get())
        .bind(cutoff_millis)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(decode_record).transpose()
}

pub async fn delete_by_item(conn: &mut SqliteConnection, item_id: &ItemId) -> Result<bool, Error> {
    let result = query("DELETE FROM install_sessions WHERE item_id = ?1")
        .bind(item_id.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_since(
    conn: &mut SqliteConnection,
    cutoff_millis: i64,
) -> Result<Vec<SessionRecord>, Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM install_sessions WHERE created_at >= ?1 ORDER BY created_at"
    );
    let rows = query(&sql).bind(cutoff_millis).fetch_all(&mut *conn).await?;

    rows.iter().map(decode_record).collect()
}

pub async fn list_before(
    conn: &mut SqliteConnection,
    cutoff_millis: i64,
) -> Result<Vec<SessionRecord>, Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM install_sessions WHERE created_at < ?1 ORDER BY created_at"
    );
    let rows = query(&sql).bind(cutoff_millis).fetch_all(&mut *conn).await?;

    rows.iter().map(decode_record).collect()
}

pub async fn delete_before(conn: &mut SqliteConnection, cutoff_millis: i64) -> Result<u64, Error> {
    let result = query("DELETE FROM install_sessions WHERE created_at < ?1")
        .bind(cutoff_millis)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

fn decode_record(row: &SqliteRow) -> Result<SessionRecord, Error> {
    let item_id: String = row.try_get("item_id").map_err(StorageError::from)?;
    let session_id: i32 = row.try_get("session_id").map_err(StorageError::from)?;
    let created_millis: i64 = row.try_get("created_at").map_err(StorageError::from)?;
    let kind: String = row.try_get("kind").map_err(StorageError::from)?;

    let created_at: DateTime<Utc> =
        DateTime::from_timestamp_millis(created_millis).ok_or_else(|| {
            StorageError::CorruptedData {
                message: format!("invalid created_at {created_millis} for {item_id}"),
            }
        })?;
    let kind: OperationKind = kind
        .parse()
        .map_err(|message| StorageError::CorruptedData { message })?;

    Ok(SessionRecord {
        item_id: ItemId::new(item_id),
        session_id: SessionId(session_id),
        created_at,
        kind,
    })
}
