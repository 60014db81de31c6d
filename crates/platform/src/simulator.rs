//! In-process installer that honours the platform callback contract
//!
//! Sessions, installed packages and pending confirmations live behind one
//! async mutex and are optionally mirrored to a JSON file so separate
//! processes observe each other. Committed work completes on a spawned task
//! after a short delay, reporting through the signal channel exactly like
//! the real installer would.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sideload_errors::{Error, GatewayError, InstallError};
use sideload_types::{
    now_millis, CallbackTarget, ConfirmationAction, FailureKind, InstalledPackage,
    InstallerCallback, InstallerStatus, PlatformSession, SessionId,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::gateway::{InstallerGateway, PayloadStream, PlatformSignal, SignalSender};
use crate::persist;

/// Behaviour of a [`SimulatedInstaller`]
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    pub installer_id: String,
    /// Ask for confirmation before every commit and uninstall
    pub require_user_action: bool,
    /// Terminal status reported once work completes
    pub outcome: InstallerStatus,
    pub callback_delay: Duration,
    /// Mirror state to this file when set
    pub state_file: Option<PathBuf>,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            installer_id: "com.sideload.client".to_string(),
            require_user_action: false,
            outcome: InstallerStatus::Success,
            callback_delay: Duration::from_millis(10),
            state_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimSession {
    info: PlatformSession,
    #[serde(default)]
    bytes_written: u64,
}

/// Work handed to the installer, waiting to complete
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingWork {
    package_id: String,
    target: CallbackTarget,
    #[serde(default)]
    awaiting_user: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SimState {
    #[serde(default)]
    next_id: i32,
    #[serde(default)]
    installed: BTreeMap<String, InstalledPackage>,
    #[serde(default)]
    sessions: BTreeMap<i32, SimSession>,
    #[serde(default)]
    pending: BTreeMap<i32, PendingWork>,
}

impl SimState {
    fn allocate_id(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId(self.next_id)
    }
}

fn confirmation_callback(request: SessionId, work: &PendingWork) -> InstallerCallback {
    InstallerCallback::new(request, work.target, InstallerStatus::PendingUserAction)
        .with_package(work.package_id.clone())
        .with_confirmation(ConfirmationAction(format!(
            "sideload://confirm/{}",
            request.get()
        )))
}

#[derive(Debug, Clone, Copy)]
struct Knobs {
    available: bool,
    require_user_action: bool,
    outcome: InstallerStatus,
}

#[derive(Debug)]
struct Inner {
    installer_id: String,
    callback_delay: Duration,
    state_file: Option<PathBuf>,
    signals: SignalSender,
    state: Mutex<SimState>,
    knobs: Mutex<Knobs>,
    created_sessions: std::sync::atomic::AtomicUsize,
}

/// Simulated platform installer
#[derive(Debug, Clone)]
pub struct SimulatedInstaller {
    inner: Arc<Inner>,
}

impl SimulatedInstaller {
    /// Create an installer with empty state
    #[must_use]
    pub fn new(options: SimulatorOptions, signals: SignalSender) -> Self {
        Self::with_state(options, signals, SimState::default())
    }

    /// Create an installer, restoring state from `options.state_file` if present
    ///
    /// Work committed before the restart resumes: unconfirmed work is
    /// scheduled again and work awaiting the user re-announces its
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be read or parsed.
    pub async fn load(options: SimulatorOptions, signals: SignalSender) -> Result<Self, Error> {
        let state = match &options.state_file {
            Some(path) => persist::read_json(path).await?.unwrap_or_default(),
            None => SimState::default(),
        };
        let pending: Vec<(SessionId, PendingWork)> = state
            .pending
            .iter()
            .map(|(id, work)| (SessionId(*id), work.clone()))
            .collect();
        let installer = Self::with_state(options, signals, state);

        for (request, work) in pending {
            if work.awaiting_user {
                tracing::debug!(session = %request, "re-announcing pending confirmation");
                installer.emit(PlatformSignal::Installer(confirmation_callback(request, &work)));
            } else {
                tracing::debug!(session = %request, "resuming committed work");
                installer.schedule(request);
            }
        }
        Ok(installer)
    }

    fn with_state(options: SimulatorOptions, signals: SignalSender, state: SimState) -> Self {
        let knobs = Knobs {
            available: true,
            require_user_action: options.require_user_action,
            outcome: options.outcome,
        };
        Self {
            inner: Arc::new(Inner {
                installer_id: options.installer_id,
                callback_delay: options.callback_delay,
                state_file: options.state_file,
                signals,
                state: Mutex::new(state),
                knobs: Mutex::new(knobs),
                created_sessions: std::sync::atomic::AtomicUsize::new(0),
            }),
        }
    }

    /// Make every request fail with `GatewayError::Unavailable`
    pub async fn set_available(&self, available: bool) {
        self.inner.knobs.lock().await.available = available;
    }

    pub async fn set_outcome(&self, outcome: InstallerStatus) {
        self.inner.knobs.lock().await.outcome = outcome;
    }

    pub async fn set_require_user_action(&self, require: bool) {
        self.inner.knobs.lock().await.require_user_action = require;
    }

    /// Number of `create_session` calls that produced a session
    #[must_use]
    pub fn created_sessions(&self) -> usize {
        self.inner
            .created_sessions
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Record a package as installed without going through a session
    pub async fn mark_installed(&self, package_id: &str, last_update_millis: i64) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        state.installed.insert(
            package_id.to_string(),
            InstalledPackage {
                package_id: package_id.to_string(),
                last_update_millis,
                installer_id: Some(self.inner.installer_id.clone()),
            },
        );
        self.persist(&state).await
    }

    /// Add a session opened outside this client (or left behind by a crash)
    pub async fn inject_session(&self, session: PlatformSession) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        state.next_id = state.next_id.max(session.session_id.get());
        state.sessions.insert(
            session.session_id.get(),
            SimSession {
                info: session,
                bytes_written: 0,
            },
        );
        self.persist(&state).await
    }

    /// Requests currently waiting for the user
    pub async fn awaiting_confirmation(&self) -> Vec<SessionId> {
        let state = self.inner.state.lock().await;
        state
            .pending
            .iter()
            .filter(|(_, work)| work.awaiting_user)
            .map(|(id, _)| SessionId(*id))
            .collect()
    }

    /// Push a raw signal, bypassing the simulation
    pub fn emit(&self, signal: PlatformSignal) {
        if self.inner.signals.send(signal).is_err() {
            tracing::debug!("platform signal dropped, no listener");
        }
    }

    /// The user accepted the confirmation for `request`
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::SessionNotFound` if nothing is waiting on `request`.
    pub async fn approve(&self, request: SessionId) -> Result<(), Error> {
        self.ensure_awaiting(request).await?;
        let outcome = self.inner.knobs.lock().await.outcome;
        self.complete(request, outcome).await
    }

    /// The user declined the confirmation for `request`
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::SessionNotFound` if nothing is waiting on `request`.
    pub async fn reject(&self, request: SessionId) -> Result<(), Error> {
        self.ensure_awaiting(request).await?;
        self.complete(request, InstallerStatus::Failure(FailureKind::Aborted))
            .await
    }

    async fn ensure_awaiting(&self, request: SessionId) -> Result<(), Error> {
        let state = self.inner.state.lock().await;
        match state.pending.get(&request.get()) {
            Some(work) if work.awaiting_user => Ok(()),
            _ => Err(GatewayError::SessionNotFound {
                session_id: request.get(),
            }
            .into()),
        }
    }

    async fn ensure_available(&self) -> Result<(), Error> {
        if self.inner.knobs.lock().await.available {
            Ok(())
        } else {
            Err(GatewayError::Unavailable {
                message: "simulated installer is offline".to_string(),
            }
            .into())
        }
    }

    async fn persist(&self, state: &SimState) -> Result<(), Error> {
        match &self.inner.state_file {
            Some(path) => persist::write_json_atomic(path, state).await,
            None => Ok(()),
        }
    }

    /// Advance `request` once the callback delay has elapsed
    fn schedule(&self, request: SessionId) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.inner.callback_delay).await;
            if let Err(e) = this.advance(request).await {
                tracing::warn!(session = %request, error = %e, "simulated installer step failed");
            }
        });
    }

    async fn advance(&self, request: SessionId) -> Result<(), Error> {
        let knobs = *self.inner.knobs.lock().await;
        if !knobs.require_user_action {
            return self.complete(request, knobs.outcome).await;
        }

        let mut state = self.inner.state.lock().await;
        let Some(work) = state.pending.get_mut(&request.get()) else {
            return Ok(());
        };
        work.awaiting_user = true;
        let callback = confirmation_callback(request, work);
        self.persist(&state).await?;
        drop(state);

        self.emit(PlatformSignal::Installer(callback));
        Ok(())
    }

    /// Finish `request` with `status` and report it
    async fn complete(&self, request: SessionId, status: InstallerStatus) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        let Some(work) = state.pending.remove(&request.get()) else {
            return Ok(());
        };
        state.sessions.remove(&request.get());

        let mut callback = InstallerCallback::new(request, work.target, status)
            .with_package(work.package_id.clone());
        let mut signals = Vec::new();

        match (status, work.target) {
            (InstallerStatus::Success, CallbackTarget::Uninstall) => {
                state.installed.remove(&work.package_id);
                signals.push(PlatformSignal::PackageRemoved {
                    package_id: work.package_id.clone(),
                    replacing: false,
                });
            }
            (InstallerStatus::Success, target) => {
                let replacing = state.installed.contains_key(&work.package_id);
                state.installed.insert(
                    work.package_id.clone(),
                    InstalledPackage {
                        package_id: work.package_id.clone(),
                        last_update_millis: now_millis(),
                        installer_id: Some(self.inner.installer_id.clone()),
                    },
                );
                if replacing || target == CallbackTarget::Upgrade {
                    signals.push(PlatformSignal::PackageRemoved {
                        package_id: work.package_id.clone(),
                        replacing: true,
                    });
                }
                signals.push(PlatformSignal::PackageAdded {
                    package_id: work.package_id.clone(),
                });
            }
            (InstallerStatus::Failure(kind), _) => {
                callback = callback.with_message(kind.describe());
            }
            _ => {}
        }
        self.persist(&state).await?;
        drop(state);

        tracing::debug!(session = %request, status = %status, target = %work.target, "simulated installer finished");
        self.emit(PlatformSignal::Installer(callback));
        for signal in signals {
            self.emit(signal);
        }
        Ok(())
    }
}

#[async_trait]
impl InstallerGateway for SimulatedInstaller {
    fn installer_id(&self) -> &str {
        &self.inner.installer_id
    }

    async fn create_session(
        &self,
        app_label: &str,
        package_id: &str,
    ) -> Result<SessionId, Error> {
        self.ensure_available().await?;

        let mut state = self.inner.state.lock().await;
        let session_id = state.allocate_id();
        state.sessions.insert(
            session_id.get(),
            SimSession {
                info: PlatformSession {
                    session_id,
                    package_id: Some(package_id.to_string()),
                    app_label: Some(app_label.to_string()),
                    installer_id: self.inner.installer_id.clone(),
                    active: true,
                },
                bytes_written: 0,
            },
        );
        self.persist(&state).await?;
        self.inner
            .created_sessions
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        tracing::debug!(session = %session_id, package = package_id, "simulated session created");
        Ok(session_id)
    }

    async fn open_and_write(
        &self,
        session_id: SessionId,
        mut payload: PayloadStream,
    ) -> Result<u64, Error> {
        self.ensure_available().await?;
        {
            let state = self.inner.state.lock().await;
            match state.sessions.get(&session_id.get()) {
                None => {
                    return Err(GatewayError::SessionNotFound {
                        session_id: session_id.get(),
                    }
                    .into())
                }
                Some(session) if !session.info.active => {
                    return Err(GatewayError::SessionClosed {
                        session_id: session_id.get(),
                    }
                    .into())
                }
                Some(_) => {}
            }
        }

        let written = tokio::io::copy(&mut payload, &mut tokio::io::sink())
            .await
            .map_err(|e| GatewayError::WriteFailed {
                session_id: session_id.get(),
                message: e.to_string(),
            })?;

        let mut state = self.inner.state.lock().await;
        if let Some(session) = state.sessions.get_mut(&session_id.get()) {
            session.bytes_written += written;
        }
        self.persist(&state).await?;
        Ok(written)
    }

    async fn commit(&self, session_id: SessionId, target: CallbackTarget) -> Result<(), Error> {
        self.ensure_available().await?;

        let mut state = self.inner.state.lock().await;
        let package_id = match state.sessions.get(&session_id.get()) {
            Some(session) if session.info.active => session.info.package_id.clone(),
            Some(_) => {
                return Err(GatewayError::SessionClosed {
                    session_id: session_id.get(),
                }
                .into())
            }
            None => {
                return Err(GatewayError::SessionNotFound {
                    session_id: session_id.get(),
                }
                .into())
            }
        };
        let Some(package_id) = package_id else {
            return Err(GatewayError::CommitFailed {
                session_id: session_id.get(),
                message: "session has no package".to_string(),
            }
            .into());
        };
        if state.pending.contains_key(&session_id.get()) {
            return Err(GatewayError::CommitFailed {
                session_id: session_id.get(),
                message: "session already committed".to_string(),
            }
            .into());
        }
        state.pending.insert(
            session_id.get(),
            PendingWork {
                package_id,
                target,
                awaiting_user: false,
            },
        );
        self.persist(&state).await?;
        drop(state);

        self.schedule(session_id);
        Ok(())
    }

    async fn uninstall(&self, package_id: &str, target: CallbackTarget) -> Result<(), Error> {
        self.ensure_available().await?;

        let mut state = self.inner.state.lock().await;
        if !state.installed.contains_key(package_id) {
            return Err(GatewayError::UninstallFailed {
                package: package_id.to_string(),
                message: "package is not installed".to_string(),
            }
            .into());
        }
        let request = state.allocate_id();
        state.pending.insert(
            request.get(),
            PendingWork {
                package_id: package_id.to_string(),
                target,
                awaiting_user: false,
            },
        );
        self.persist(&state).await?;
        drop(state);

        self.schedule(request);
        Ok(())
    }

    async fn query_installed_packages(&self) -> Result<BTreeMap<String, InstalledPackage>, Error> {
        self.ensure_available().await?;
        Ok(self.inner.state.lock().await.installed.clone())
    }

    async fn list_active_sessions(&self) -> Result<Vec<PlatformSession>, Error> {
        self.ensure_available().await?;
        let state = self.inner.state.lock().await;
        Ok(state
            .sessions
            .values()
            .map(|session| session.info.clone())
            .collect())
    }

    async fn session_info(&self, session_id: SessionId) -> Result<Option<PlatformSession>, Error> {
        self.ensure_available().await?;
        let state = self.inner.state.lock().await;
        Ok(state
            .sessions
            .get(&session_id.get())
            .map(|session| session.info.clone()))
    }

    async fn abandon_session(&self, session_id: SessionId) -> Result<(), Error> {
        self.ensure_available().await?;
        let mut state = self.inner.state.lock().await;
        let dropped = state.sessions.remove(&session_id.get()).is_some();
        state.pending.remove(&session_id.get());
        self.persist(&state).await?;
        if dropped {
            tracing::debug!(session = %session_id, "simulated session abandoned");
        }
        Ok(())
    }

    async fn can_request_package_installs(&self) -> Result<bool, Error> {
        Ok(self.inner.knobs.lock().await.available)
    }

    async fn open_app(&self, package_id: &str) -> Result<(), Error> {
        self.ensure_available().await?;
        if self.inner.state.lock().await.installed.contains_key(package_id) {
            tracing::info!(package = package_id, "launching app");
            Ok(())
        } else {
            Err(InstallError::NotInstalled {
                item: package_id.to_string(),
            }
            .into())
        }
    }
}
