//! Session storage error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum StorageError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("migration failed: {message}")]
    MigrationFailed { message: String },

    #[error("corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("session {session_id} is already tracked for {item}")]
    SessionConflict { session_id: i32, item: String },
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}

impl UserFacingError for StorageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Database { .. } => {
                Some("Check that the state directory is writable, then retry.")
            }
            Self::CorruptedData { .. } | Self::MigrationFailed { .. } => {
                Some("Remove the session database; it is rebuilt on next start.")
            }
            Self::SessionConflict { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Database { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Database { .. } => "storage.database",
            Self::MigrationFailed { .. } => "storage.migration_failed",
            Self::CorruptedData { .. } => "storage.corrupted_data",
            Self::SessionConflict { .. } => "storage.session_conflict",
        };
        Some(code)
    }
}
