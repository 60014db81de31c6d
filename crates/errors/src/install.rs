//! Install/upgrade lifecycle error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstallError {
    #[error("item not in catalog: {item}")]
    UnknownItem { item: String },

    #[error("{item} is already installed and up to date")]
    AlreadyInstalled { item: String },

    #[error("{item} is not installed")]
    NotInstalled { item: String },

    #[error("no tracked session for {reference}")]
    SessionNotFound { reference: String },

    #[error("installer reported unexpected status value {code}")]
    UnexpectedStatusValue { code: i32 },

    #[error("payload for {item} not found at {path}")]
    PayloadNotFound { item: String, path: String },

    #[error("missing component: {component}")]
    MissingComponent { component: String },
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownItem { .. } => Some("Run `sideload library` to list available apps."),
            Self::PayloadNotFound { .. } => {
                Some("Place the package file in the payload directory or pass --payload.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownItem { .. } => "install.unknown_item",
            Self::AlreadyInstalled { .. } => "install.already_installed",
            Self::NotInstalled { .. } => "install.not_installed",
            Self::SessionNotFound { .. } => "install.session_not_found",
            Self::UnexpectedStatusValue { .. } => "install.unexpected_status",
            Self::PayloadNotFound { .. } => "install.payload_not_found",
            Self::MissingComponent { .. } => "install.missing_component",
        };
        Some(code)
    }
}
