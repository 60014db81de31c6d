//! Process-scoped installer runtime

use sideload_catalog::LibrarySnapshot;
use sideload_config::Config;
use sideload_errors::Error;
use sideload_events::Subscription;
use sideload_platform::SignalReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{LibraryProjection, PayloadSource, ReconcileReport, SessionCoordinator, UpdateScheduler};

/// Knobs for [`InstallerRuntime::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub check_interval: Duration,
    /// Run the refresh and auto-update timers; one-shot commands turn this off
    pub timers: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            timers: true,
        }
    }
}

impl RuntimeOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_interval: config.check_interval(),
            timers: true,
        }
    }

    /// Same options with the refresh and auto-update timers left off
    #[must_use]
    pub fn without_timers(self) -> Self {
        Self {
            timers: false,
            ..self
        }
    }
}

/// Everything that lives for the duration of the process: the coordinator,
/// the platform signal loop, the library projection and the timers.
///
/// Created once at startup, torn down with [`InstallerRuntime::shutdown`].
pub struct InstallerRuntime {
    coordinator: SessionCoordinator,
    projection: LibraryProjection,
    scheduler: UpdateScheduler,
    report: ReconcileReport,
    tasks: Vec<JoinHandle<()>>,
}

impl InstallerRuntime {
    /// Reconcile, then start the signal loop, projection and (unless
    /// disabled in `options`) timers.
    ///
    /// # Errors
    ///
    /// Fails when startup reconciliation fails; nothing is started then.
    pub async fn start(
        coordinator: SessionCoordinator,
        signals: SignalReceiver,
        source: Arc<dyn PayloadSource>,
        options: RuntimeOptions,
    ) -> Result<Self, Error> {
        let report = coordinator.reconcile_on_startup().await?;

        let events = coordinator.bus().subscribe();
        let signal_task = coordinator.spawn_signal_loop(signals);

        let initial = match coordinator.library().snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "initial library snapshot failed");
                LibrarySnapshot::default()
            }
        };
        let projection = LibraryProjection::new(initial);
        let projection_task = projection.spawn(events);

        let scheduler = UpdateScheduler::new(
            coordinator.clone(),
            source,
            projection.clone(),
            options.check_interval,
        );
        let mut tasks = vec![signal_task, projection_task];
        if options.timers {
            scheduler.start();
            tasks.push(scheduler.watch_settings());
        }

        tracing::debug!(timers = options.timers, "installer runtime started");
        Ok(Self {
            coordinator,
            projection,
            scheduler,
            report,
            tasks,
        })
    }

    #[must_use]
    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn projection(&self) -> &LibraryProjection {
        &self.projection
    }

    /// Watch the library view as it changes
    #[must_use]
    pub fn library(&self) -> watch::Receiver<LibrarySnapshot> {
        self.projection.subscribe()
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.coordinator.bus().subscribe()
    }

    /// What startup reconciliation changed
    #[must_use]
    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }

    /// Stop the timers and abort every background task
    pub fn shutdown(mut self) {
        self.abort_all();
        tracing::debug!("installer runtime stopped");
    }

    fn abort_all(&mut self) {
        self.scheduler.stop();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for InstallerRuntime {
    fn drop(&mut self) {
        self.abort_all();
    }
}
