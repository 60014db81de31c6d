//! Values exchanged with the platform package installer

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SessionId;

/// The seven failure sub-kinds the installer can report.
///
/// They all collapse into one outward failure signal; the kind is kept for
/// diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Generic,
    Aborted,
    Blocked,
    Conflict,
    Incompatible,
    Invalid,
    Storage,
}

impl FailureKind {
    pub const ALL: [Self; 7] = [
        Self::Generic,
        Self::Aborted,
        Self::Blocked,
        Self::Conflict,
        Self::Incompatible,
        Self::Invalid,
        Self::Storage,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Aborted => "aborted",
            Self::Blocked => "blocked",
            Self::Conflict => "conflict",
            Self::Incompatible => "incompatible",
            Self::Invalid => "invalid",
            Self::Storage => "storage",
        }
    }

    /// Human-readable diagnostic shown to the user on failure
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Generic => "The installation failed for an unspecified reason.",
            Self::Aborted => "The installation was cancelled.",
            Self::Blocked => "The installation was blocked by the system or a policy.",
            Self::Conflict => "The app conflicts with an already installed package.",
            Self::Incompatible => "The app is not compatible with this device.",
            Self::Invalid => "The package file is invalid or corrupted.",
            Self::Storage => "There is not enough storage space to install the app.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by an installer callback.
///
/// Codes outside the known set are preserved as `Unknown` rather than
/// rejected; newer platforms may add statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallerStatus {
    PendingUserAction,
    Success,
    Failure(FailureKind),
    Unknown(i32),
}

impl InstallerStatus {
    /// Map the platform's integer status code
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::PendingUserAction,
            0 => Self::Success,
            1 => Self::Failure(FailureKind::Generic),
            2 => Self::Failure(FailureKind::Blocked),
            3 => Self::Failure(FailureKind::Aborted),
            4 => Self::Failure(FailureKind::Invalid),
            5 => Self::Failure(FailureKind::Conflict),
            6 => Self::Failure(FailureKind::Storage),
            7 => Self::Failure(FailureKind::Incompatible),
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::PendingUserAction => -1,
            Self::Success => 0,
            Self::Failure(FailureKind::Generic) => 1,
            Self::Failure(FailureKind::Blocked) => 2,
            Self::Failure(FailureKind::Aborted) => 3,
            Self::Failure(FailureKind::Invalid) => 4,
            Self::Failure(FailureKind::Conflict) => 5,
            Self::Failure(FailureKind::Storage) => 6,
            Self::Failure(FailureKind::Incompatible) => 7,
            Self::Unknown(code) => code,
        }
    }

    /// Success or any failure sub-kind ends the session's active lifetime
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure(_))
    }
}

impl fmt::Display for InstallerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingUserAction => f.write_str("pending_user_action"),
            Self::Success => f.write_str("success"),
            Self::Failure(kind) => write!(f, "failure_{kind}"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Which flow a callback routes back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackTarget {
    Install,
    Upgrade,
    Uninstall,
}

impl CallbackTarget {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque token the UI hands back to the platform to show its confirmation screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationAction(pub String);

/// Asynchronous status report for a tracked session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerCallback {
    pub session_id: SessionId,
    pub target: CallbackTarget,
    pub status: InstallerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationAction>,
}

impl InstallerCallback {
    #[must_use]
    pub fn new(session_id: SessionId, target: CallbackTarget, status: InstallerStatus) -> Self {
        Self {
            session_id,
            target,
            status,
            status_message: None,
            package_id: None,
            confirmation: None,
        }
    }

    #[must_use]
    pub fn with_package(mut self, package_id: impl Into<String>) -> Self {
        self.package_id = Some(package_id.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_confirmation(mut self, action: ConfirmationAction) -> Self {
        self.confirmation = Some(action);
        self
    }
}

/// Installed package metadata as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub package_id: String,
    /// Epoch millis of the last install or replace
    pub last_update_millis: i64,
    #[serde(default)]
    pub installer_id: Option<String>,
}

/// Live session as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSession {
    pub session_id: SessionId,
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub app_label: Option<String>,
    /// Identity of the installer that opened the session
    pub installer_id: String,
    pub active: bool,
}
