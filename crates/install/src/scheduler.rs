//! Library refresh and auto-update timers

use sideload_catalog::LibrarySnapshot;
use sideload_errors::Error;
use sideload_types::{ItemId, UpdateSettings};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::{InstallOutcome, LibraryProjection, PayloadSource, RecurringTimer, SessionCoordinator};

/// Items touched by one auto-update pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoUpdateReport {
    pub started: Vec<ItemId>,
    /// Already had a committed session
    pub in_progress: Vec<ItemId>,
    pub failed: Vec<(ItemId, String)>,
}

struct SchedulerInner {
    coordinator: SessionCoordinator,
    source: Arc<dyn PayloadSource>,
    projection: LibraryProjection,
    check_interval: Duration,
    refresh: RecurringTimer,
    auto_update: RecurringTimer,
}

/// Owns the two recurring timers of the runtime.
///
/// The refresh timer recomputes the library snapshot every check interval.
/// The auto-update timer runs only while the schedule is non-zero and is
/// restarted whenever the update settings change.
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<SchedulerInner>,
}

impl UpdateScheduler {
    #[must_use]
    pub fn new(
        coordinator: SessionCoordinator,
        source: Arc<dyn PayloadSource>,
        projection: LibraryProjection,
        check_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                coordinator,
                source,
                projection,
                check_interval,
                refresh: RecurringTimer::new("library-refresh"),
                auto_update: RecurringTimer::new("auto-update"),
            }),
        }
    }

    /// Start the refresh timer and the auto-update timer for the current settings
    pub fn start(&self) {
        let coordinator = self.inner.coordinator.clone();
        let projection = self.inner.projection.clone();
        self.inner.refresh.start(self.inner.check_interval, move || {
            let coordinator = coordinator.clone();
            let projection = projection.clone();
            async move {
                if let Err(e) = refresh(&coordinator, &projection).await {
                    tracing::warn!(error = %e, "library refresh failed");
                }
            }
        });
        self.apply_settings(self.inner.coordinator.settings().current());
    }

    /// (Re)start or stop the auto-update timer for `settings`
    pub fn apply_settings(&self, settings: UpdateSettings) {
        let Some(period) = settings.schedule() else {
            self.inner.auto_update.stop();
            tracing::debug!("auto-update disabled");
            return;
        };
        let coordinator = self.inner.coordinator.clone();
        let source = self.inner.source.clone();
        self.inner.auto_update.start(period, move || {
            let coordinator = coordinator.clone();
            let source = source.clone();
            async move {
                match auto_update(&coordinator, source.as_ref()).await {
                    Ok(report) if !report.started.is_empty() => {
                        tracing::info!(started = report.started.len(), "auto-update pass started upgrades");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "auto-update pass failed"),
                }
            }
        });
    }

    /// Restart timers whenever the shared update settings are replaced
    #[must_use]
    pub fn watch_settings(&self) -> JoinHandle<()> {
        let mut rx = self.inner.coordinator.settings().subscribe();
        let weak: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let settings = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else { break };
                UpdateScheduler { inner }.apply_settings(settings);
            }
        })
    }

    /// Recompute the snapshot now and publish it to the projection
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the platform cannot be queried.
    pub async fn refresh_now(&self) -> Result<LibrarySnapshot, Error> {
        refresh(&self.inner.coordinator, &self.inner.projection).await
    }

    /// Upgrade every item that currently has an update available
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the snapshot cannot be computed;
    /// per-item failures are collected in the report.
    pub async fn run_auto_update(&self) -> Result<AutoUpdateReport, Error> {
        auto_update(&self.inner.coordinator, self.inner.source.as_ref()).await
    }

    #[must_use]
    pub fn is_auto_update_running(&self) -> bool {
        self.inner.auto_update.is_running()
    }

    pub fn stop(&self) {
        self.inner.refresh.stop();
        self.inner.auto_update.stop();
    }
}

async fn refresh(
    coordinator: &SessionCoordinator,
    projection: &LibraryProjection,
) -> Result<LibrarySnapshot, Error> {
    let snapshot = coordinator.library().snapshot().await?;
    projection.replace(snapshot.clone());
    Ok(snapshot)
}

async fn auto_update(
    coordinator: &SessionCoordinator,
    source: &dyn PayloadSource,
) -> Result<AutoUpdateReport, Error> {
    let snapshot = coordinator.library().snapshot().await?;
    let candidates: Vec<ItemId> = snapshot
        .updates_available()
        .map(|item| item.id.clone())
        .collect();

    let mut report = AutoUpdateReport::default();
    for item_id in candidates {
        match coordinator.install_from(&item_id, source).await {
            Ok(InstallOutcome::Committed { .. }) => report.started.push(item_id),
            Ok(InstallOutcome::AlreadyInProgress { .. }) => report.in_progress.push(item_id),
            Err(e) => {
                tracing::warn!(item = %item_id, error = %e, "auto-update failed");
                report.failed.push((item_id, e.to_string()));
            }
        }
    }
    Ok(report)
}
