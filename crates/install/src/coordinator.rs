//! Session lifecycle coordinator

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use sideload_catalog::{Catalog, LibraryCatalog};
use sideload_config::{Config, SettingsHandle};
use sideload_errors::{Error, InstallError};
use sideload_events::SyncEventBus;
use sideload_platform::{InstallerGateway, PayloadStream, SignalReceiver};
use sideload_state::SessionStore;
use sideload_types::{
    CallbackTarget, Item, ItemId, OperationKind, SessionId, SessionRecord,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::prompts::{HeadlessPrompter, PendingPrompts, UserPrompter};
use crate::{ItemLocks, PayloadSource};

const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(60);

/// Handle to an open platform session tracked for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub item_id: ItemId,
    pub session_id: SessionId,
    pub kind: OperationKind,
    /// Whether an already-open session was returned instead of a new one
    pub reused: bool,
}

impl SessionHandle {
    /// Callback target the commit registers
    #[must_use]
    pub fn callback_target(&self) -> CallbackTarget {
        match self.kind {
            OperationKind::Install => CallbackTarget::Install,
            OperationKind::Upgrade => CallbackTarget::Upgrade,
        }
    }
}

/// Result of streaming and committing a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { bytes: u64 },
    /// Another caller already committed this session; its callback is pending
    AlreadyInProgress,
}

/// Result of a full install/upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Committed { handle: SessionHandle, bytes: u64 },
    AlreadyInProgress { handle: SessionHandle },
}

impl InstallOutcome {
    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        match self {
            Self::Committed { handle, .. } | Self::AlreadyInProgress { handle } => handle,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) gateway: Arc<dyn InstallerGateway>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) bus: SyncEventBus,
    pub(crate) prompter: Arc<dyn UserPrompter>,
    pub(crate) library: LibraryCatalog,
    pub(crate) settings: SettingsHandle,
    pub(crate) locks: ItemLocks,
    pub(crate) prompts: PendingPrompts,
    /// Items whose success was published from an installer callback
    pub(crate) settled: DashMap<ItemId, Instant>,
    /// Sessions with a commit in flight
    pub(crate) claims: DashSet<SessionId>,
    pub(crate) dedupe_window: Duration,
    pub(crate) reconciled: AtomicBool,
}

/// Sole owner of session records.
///
/// Every state-mutating operation takes the per-item lock, so two
/// transitions for the same item never interleave while different items run
/// in parallel. Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct SessionCoordinator {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("installer_id", &self.inner.gateway.installer_id())
            .field("items", &self.inner.catalog.len())
            .field("reconciled", &self.is_reconciled())
            .finish_non_exhaustive()
    }
}

impl SessionCoordinator {
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn library(&self) -> &LibraryCatalog {
        &self.inner.library
    }

    #[must_use]
    pub fn bus(&self) -> &SyncEventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsHandle {
        &self.inner.settings
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn InstallerGateway> {
        &self.inner.gateway
    }

    /// Whether startup reconciliation has completed in this process
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        self.inner.reconciled.load(Ordering::Acquire)
    }

    fn catalog_item(&self, item_id: &ItemId) -> Result<&Item, Error> {
        self.inner.catalog.get(item_id.as_str()).ok_or_else(|| {
            InstallError::UnknownItem {
                item: item_id.to_string(),
            }
            .into()
        })
    }

    /// Open (or reuse) the session installing `item_id`.
    ///
    /// A live session already recorded for the item is returned as is, so
    /// concurrent and repeated calls never open a second platform session.
    /// On a new session the record is persisted and `Installing` is
    /// published before any payload I/O.
    ///
    /// # Errors
    ///
    /// Fails for items outside the catalog, items that are installed without
    /// an available update, and gateway or store errors. A gateway failure
    /// publishes nothing.
    pub async fn begin_install(&self, item_id: &ItemId) -> Result<SessionHandle, Error> {
        let item = self.catalog_item(item_id)?;
        let _guard = self.inner.locks.lock(item_id).await;

        let existing = match self.inner.store.get_by_item(item_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(item = %item_id, error = %e, "session lookup failed, treating as absent");
                None
            }
        };

        if let Some(record) = existing {
            let live = self
                .inner
                .gateway
                .session_info(record.session_id)
                .await?
                .is_some_and(|session| session.active);
            if live {
                tracing::debug!(
                    item = %item_id,
                    session = %record.session_id,
                    "reusing open session"
                );
                return Ok(SessionHandle {
                    item_id: record.item_id,
                    session_id: record.session_id,
                    kind: record.kind,
                    reused: true,
                });
            }
            tracing::info!(
                item = %item_id,
                session = %record.session_id,
                "recorded session is gone on the platform, discarding"
            );
            self.inner.store.delete(item_id).await?;
            self.inner.claims.remove(&record.session_id);
        }

        let installed = self.inner.gateway.query_installed_packages().await?;
        let kind = match installed.get(item_id.as_str()) {
            None => OperationKind::Install,
            Some(package)
                if self
                    .inner
                    .settings
                    .current()
                    .is_stale(package.last_update_millis, Utc::now()) =>
            {
                OperationKind::Upgrade
            }
            Some(_) => {
                return Err(InstallError::AlreadyInstalled {
                    item: item_id.to_string(),
                }
                .into())
            }
        };

        let session_id = self
            .inner
            .gateway
            .create_session(&item.display_label, item_id.as_str())
            .await
            .inspect_err(|e| {
                tracing::warn!(item = %item_id, error = %e, "failed to open installer session");
            })?;

        let record = SessionRecord::new(item_id.clone(), session_id, kind);
        if let Err(e) = self.inner.store.put(&record).await {
            tracing::error!(
                item = %item_id,
                session = %session_id,
                error = %e,
                "session opened but not recorded; it is adopted at next startup"
            );
            return Err(e);
        }

        self.inner.bus.publish_for_session(
            sideload_events::SyncEvent::installing(item_id.clone()),
            session_id,
            [("kind", kind.as_str())],
        );

        Ok(SessionHandle {
            item_id: item_id.clone(),
            session_id,
            kind,
            reused: false,
        })
    }

    /// Stream `payload` into the session and commit it.
    ///
    /// The outcome arrives later as an installer callback. Gateway errors are
    /// returned without retry; calling [`Self::begin_install`] again reuses
    /// the session.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from the write or the commit.
    pub async fn write_and_commit(
        &self,
        handle: &SessionHandle,
        payload: PayloadStream,
    ) -> Result<CommitOutcome, Error> {
        let session_id = handle.session_id;
        if !self.inner.claims.insert(session_id) {
            tracing::debug!(
                item = %handle.item_id,
                session = %session_id,
                "session already committed, waiting for its callback"
            );
            return Ok(CommitOutcome::AlreadyInProgress);
        }

        let result = async {
            let bytes = self.inner.gateway.open_and_write(session_id, payload).await?;
            self.inner
                .gateway
                .commit(session_id, handle.callback_target())
                .await?;
            Ok::<_, Error>(bytes)
        }
        .await;

        match result {
            Ok(bytes) => {
                tracing::info!(
                    item = %handle.item_id,
                    session = %session_id,
                    bytes,
                    kind = %handle.kind,
                    "session committed"
                );
                Ok(CommitOutcome::Committed { bytes })
            }
            Err(e) => {
                self.inner.claims.remove(&session_id);
                tracing::warn!(
                    item = %handle.item_id,
                    session = %session_id,
                    error = %e,
                    "write or commit failed"
                );
                Err(e)
            }
        }
    }

    /// Resolve the item's payload, then begin (or reuse) a session, stream
    /// the payload and commit.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::begin_install`], the payload source or
    /// [`Self::write_and_commit`].
    pub async fn install_from(
        &self,
        item_id: &ItemId,
        source: &dyn PayloadSource,
    ) -> Result<InstallOutcome, Error> {
        // A missing payload must fail before a session exists.
        self.catalog_item(item_id)?;
        let payload = source.open(item_id).await?;
        let handle = self.begin_install(item_id).await?;
        if handle.reused && self.inner.claims.contains(&handle.session_id) {
            return Ok(InstallOutcome::AlreadyInProgress { handle });
        }
        match self.write_and_commit(&handle, payload).await? {
            CommitOutcome::Committed { bytes } => Ok(InstallOutcome::Committed { handle, bytes }),
            CommitOutcome::AlreadyInProgress => Ok(InstallOutcome::AlreadyInProgress { handle }),
        }
    }

    /// Ask the platform to uninstall `item_id`.
    ///
    /// State is not changed here; the uninstall callback and the system
    /// removal notification drive it.
    ///
    /// # Errors
    ///
    /// Fails for unknown or not-installed items and for gateway errors.
    pub async fn uninstall(&self, item_id: &ItemId) -> Result<(), Error> {
        self.catalog_item(item_id)?;
        let _guard = self.inner.locks.lock(item_id).await;

        let installed = self.inner.gateway.query_installed_packages().await?;
        if !installed.contains_key(item_id.as_str()) {
            return Err(InstallError::NotInstalled {
                item: item_id.to_string(),
            }
            .into());
        }

        self.inner
            .gateway
            .uninstall(item_id.as_str(), CallbackTarget::Uninstall)
            .await?;
        tracing::info!(item = %item_id, "uninstall requested");
        Ok(())
    }

    /// Launch an installed item
    ///
    /// # Errors
    ///
    /// Fails for unknown items or when the platform cannot open the app.
    pub async fn open_app(&self, item_id: &ItemId) -> Result<(), Error> {
        self.catalog_item(item_id)?;
        self.inner.gateway.open_app(item_id.as_str()).await
    }

    /// Whether the user allowed this client to install packages
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the installer cannot be queried.
    pub async fn can_request_package_installs(&self) -> Result<bool, Error> {
        self.inner.gateway.can_request_package_installs().await
    }

    /// Drain platform signals into the coordinator, one at a time
    pub fn spawn_signal_loop(&self, mut signals: SignalReceiver) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                if let Err(e) = coordinator.handle_signal(signal).await {
                    tracing::warn!(error = %e, "failed to handle platform signal");
                }
            }
            tracing::debug!("platform signal channel closed");
        })
    }
}

/// Builder for [`SessionCoordinator`]
pub struct CoordinatorBuilder {
    catalog: Option<Arc<Catalog>>,
    gateway: Option<Arc<dyn InstallerGateway>>,
    store: Option<Arc<dyn SessionStore>>,
    bus: Option<SyncEventBus>,
    prompter: Option<Arc<dyn UserPrompter>>,
    settings: Option<SettingsHandle>,
    dedupe_window: Duration,
}

impl CoordinatorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: None,
            gateway: None,
            store: None,
            bus: None,
            prompter: None,
            settings: None,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn InstallerGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: SyncEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn UserPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SettingsHandle) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    /// Take the dedupe window, bus capacity and update settings from `config`
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.dedupe_window = config.dedupe_window();
        if self.bus.is_none() {
            self.bus = Some(SyncEventBus::new(config.events.bus_capacity));
        }
        if self.settings.is_none() {
            self.settings = Some(SettingsHandle::new(config.update_settings()));
        }
        self
    }

    /// Build the coordinator
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog, gateway or store is missing.
    pub fn build(self) -> Result<SessionCoordinator, Error> {
        let catalog = self.catalog.ok_or_else(|| InstallError::MissingComponent {
            component: "catalog".to_string(),
        })?;
        let gateway = self.gateway.ok_or_else(|| InstallError::MissingComponent {
            component: "gateway".to_string(),
        })?;
        let store = self.store.ok_or_else(|| InstallError::MissingComponent {
            component: "store".to_string(),
        })?;
        let settings = self.settings.unwrap_or_default();
        let library = LibraryCatalog::new(
            catalog.clone(),
            gateway.clone(),
            store.clone(),
            settings.clone(),
        );

        Ok(SessionCoordinator {
            inner: Arc::new(Inner {
                catalog,
                gateway,
                store,
                bus: self.bus.unwrap_or_default(),
                prompter: self
                    .prompter
                    .unwrap_or_else(|| Arc::new(HeadlessPrompter)),
                library,
                settings,
                locks: ItemLocks::new(),
                prompts: PendingPrompts::new(),
                settled: DashMap::new(),
                claims: DashSet::new(),
                dedupe_window: self.dedupe_window,
                reconciled: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
