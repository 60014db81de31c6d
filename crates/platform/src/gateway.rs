//! Request side of the platform installer

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sideload_errors::Error;
use sideload_types::{
    CallbackTarget, InstalledPackage, InstallerCallback, PlatformSession, SessionId,
};
use std::collections::BTreeMap;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Payload bytes streamed into an open session
pub type PayloadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Asynchronous reports from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum PlatformSignal {
    /// Status callback for a committed session or uninstall request
    Installer(InstallerCallback),
    /// System-wide package added broadcast
    PackageAdded { package_id: String },
    /// System-wide package removed broadcast; `replacing` is set when the
    /// removal is the first half of an in-place update
    PackageRemoved { package_id: String, replacing: bool },
}

impl PlatformSignal {
    /// Package the signal concerns, when known
    #[must_use]
    pub fn package_id(&self) -> Option<&str> {
        match self {
            Self::Installer(callback) => callback.package_id.as_deref(),
            Self::PackageAdded { package_id } | Self::PackageRemoved { package_id, .. } => {
                Some(package_id)
            }
        }
    }
}

/// Type alias for the platform signal sender
pub type SignalSender = mpsc::UnboundedSender<PlatformSignal>;

/// Type alias for the platform signal receiver
pub type SignalReceiver = mpsc::UnboundedReceiver<PlatformSignal>;

/// Create the channel platform signals are funnelled through
#[must_use]
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Capability wrapper over the platform installer.
///
/// Results of `commit` and `uninstall` are not return values; they arrive
/// later as [`PlatformSignal`]s.
#[async_trait]
pub trait InstallerGateway: Send + Sync {
    /// Identity this client is known by; sessions opened by anyone else are foreign
    fn installer_id(&self) -> &str;

    async fn create_session(&self, app_label: &str, package_id: &str)
        -> Result<SessionId, Error>;

    /// Stream the payload into the session; returns the number of bytes written
    async fn open_and_write(
        &self,
        session_id: SessionId,
        payload: PayloadStream,
    ) -> Result<u64, Error>;

    async fn commit(&self, session_id: SessionId, target: CallbackTarget) -> Result<(), Error>;

    async fn uninstall(&self, package_id: &str, target: CallbackTarget) -> Result<(), Error>;

    async fn query_installed_packages(&self) -> Result<BTreeMap<String, InstalledPackage>, Error>;

    async fn list_active_sessions(&self) -> Result<Vec<PlatformSession>, Error>;

    async fn session_info(&self, session_id: SessionId) -> Result<Option<PlatformSession>, Error>;

    /// Discard a session and any work committed through it; unknown ids are a no-op
    async fn abandon_session(&self, session_id: SessionId) -> Result<(), Error>;

    /// Whether the user has granted this client the right to install packages
    async fn can_request_package_installs(&self) -> Result<bool, Error>;

    /// Pass-through launch of an installed app
    async fn open_app(&self, package_id: &str) -> Result<(), Error>;
}
