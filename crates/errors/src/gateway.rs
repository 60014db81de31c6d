//! Errors reported by the platform installer capability

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum GatewayError {
    #[error("package installer unavailable: {message}")]
    Unavailable { message: String },

    #[error("installer session {session_id} not found")]
    SessionNotFound { session_id: i32 },

    #[error("installer session {session_id} is no longer active")]
    SessionClosed { session_id: i32 },

    #[error("failed to write payload into session {session_id}: {message}")]
    WriteFailed { session_id: i32, message: String },

    #[error("failed to commit session {session_id}: {message}")]
    CommitFailed { session_id: i32, message: String },

    #[error("failed to request uninstall of {package}: {message}")]
    UninstallFailed { package: String, message: String },

    #[error("package installs are not permitted for this installer")]
    InstallNotPermitted,
}

impl UserFacingError for GatewayError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Unavailable { .. } => {
                Some("The system package installer could not be reached; retry shortly.")
            }
            Self::InstallNotPermitted => {
                Some("Allow this app to install unknown apps in the system settings.")
            }
            Self::WriteFailed { .. } | Self::CommitFailed { .. } => {
                Some("Retry the install; the existing session will be reused.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::WriteFailed { .. } | Self::CommitFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Unavailable { .. } => "gateway.unavailable",
            Self::SessionNotFound { .. } => "gateway.session_not_found",
            Self::SessionClosed { .. } => "gateway.session_closed",
            Self::WriteFailed { .. } => "gateway.write_failed",
            Self::CommitFailed { .. } => "gateway.commit_failed",
            Self::UninstallFailed { .. } => "gateway.uninstall_failed",
            Self::InstallNotPermitted => "gateway.install_not_permitted",
        };
        Some(code)
    }
}
