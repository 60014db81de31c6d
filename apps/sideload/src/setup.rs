//! System setup and initialization

use crate::error::CliError;
use crate::prompts::ConsolePrompter;
use sideload_catalog::Catalog;
use sideload_config::{Config, SimulatedOutcome};
use sideload_install::{DirectoryPayloadSource, PayloadSource, SessionCoordinator};
use sideload_platform::{signal_channel, SignalReceiver, SimulatedInstaller, SimulatorOptions};
use sideload_state::SqliteSessionStore;
use sideload_types::{FailureKind, InstallerStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Everything a command needs, wired from configuration
pub struct SystemSetup {
    config: Config,
    coordinator: SessionCoordinator,
    payloads: Arc<dyn PayloadSource>,
    signals: Option<SignalReceiver>,
    interactive: bool,
}

impl SystemSetup {
    /// Open the session store, load the catalog and connect the installer.
    ///
    /// `interactive` decides whether confirmations are prompted on the
    /// terminal or posted as notifications.
    pub async fn initialize(config: Config, interactive: bool) -> Result<Self, CliError> {
        let state_dir = config.state_dir();
        debug!("Using state directory: {}", state_dir.display());
        tokio::fs::create_dir_all(&state_dir).await.map_err(|e| {
            CliError::Setup(format!(
                "Failed to create state directory {}: {e}",
                state_dir.display()
            ))
        })?;

        let store = SqliteSessionStore::open(&config.db_path(), config.session_ttl()).await?;
        let catalog = Catalog::load_or_sample(config.paths.catalog_file.as_deref()).await?;
        info!(items = catalog.len(), "catalog loaded");

        let (tx, rx) = signal_channel();
        let installer = SimulatedInstaller::load(simulator_options(&config), tx).await?;

        let prompter = ConsolePrompter::new(installer.clone(), interactive);
        let coordinator = SessionCoordinator::builder()
            .with_config(&config)
            .with_catalog(Arc::new(catalog))
            .with_gateway(Arc::new(installer))
            .with_store(Arc::new(store))
            .with_prompter(Arc::new(prompter))
            .build()?;

        let payloads: Arc<dyn PayloadSource> =
            Arc::new(DirectoryPayloadSource::new(config.payload_dir()));

        Ok(Self {
            config,
            coordinator,
            payloads,
            signals: Some(rx),
            interactive,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    pub fn payloads(&self) -> Arc<dyn PayloadSource> {
        self.payloads.clone()
    }

    /// Fail before touching the installer when it would wait on a prompt
    /// that cannot be shown
    pub fn ensure_can_confirm(&self) -> Result<(), CliError> {
        if self.interactive || !self.config.simulator.require_user_action {
            return Ok(());
        }
        Err(CliError::ConfirmationRequired(
            "the installer asks for confirmation but no terminal is attached; \
             run interactively or set SIDELOAD_REQUIRE_USER_ACTION=false"
                .to_string(),
        ))
    }

    /// Platform signals, handed out once to whoever runs the signal loop
    pub fn take_signals(&mut self) -> Result<SignalReceiver, CliError> {
        self.signals
            .take()
            .ok_or_else(|| CliError::Setup("platform signals already consumed".to_string()))
    }
}

fn simulator_options(config: &Config) -> SimulatorOptions {
    SimulatorOptions {
        installer_id: config.general.installer_id.clone(),
        require_user_action: config.simulator.require_user_action,
        outcome: simulated_status(config.simulator.outcome),
        callback_delay: Duration::from_millis(config.simulator.callback_delay_ms),
        state_file: Some(config.platform_state_path()),
    }
}

fn simulated_status(outcome: SimulatedOutcome) -> InstallerStatus {
    match outcome {
        SimulatedOutcome::Success => InstallerStatus::Success,
        SimulatedOutcome::Failure => InstallerStatus::Failure(FailureKind::Generic),
        SimulatedOutcome::Aborted => InstallerStatus::Failure(FailureKind::Aborted),
        SimulatedOutcome::Blocked => InstallerStatus::Failure(FailureKind::Blocked),
        SimulatedOutcome::Conflict => InstallerStatus::Failure(FailureKind::Conflict),
        SimulatedOutcome::Incompatible => InstallerStatus::Failure(FailureKind::Incompatible),
        SimulatedOutcome::Invalid => InstallerStatus::Failure(FailureKind::Invalid),
        SimulatedOutcome::Storage => InstallerStatus::Failure(FailureKind::Storage),
    }
}
