//! Startup reconciliation between the session store and the platform

use sideload_errors::Error;
use sideload_types::{ItemId, OperationKind, PlatformSession, SessionId, SessionRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;

use crate::SessionCoordinator;

/// What startup reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Expired records removed unconditionally
    pub purged: Vec<SessionRecord>,
    /// Records whose platform session no longer exists
    pub dropped: Vec<SessionRecord>,
    /// Live sessions of this installer that had no record
    pub adopted: Vec<SessionRecord>,
    /// Live sessions owned by another installer, left alone
    pub foreign: Vec<SessionId>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.purged.is_empty()
            && self.dropped.is_empty()
            && self.adopted.is_empty()
            && self.foreign.is_empty()
    }
}

impl SessionCoordinator {
    /// Bring the session store in line with the platform's live sessions.
    ///
    /// The platform decides which sessions exist; the store supplies the
    /// item each one belongs to. Expired records are purged first and their
    /// platform sessions abandoned, so a later pass cannot adopt them back.
    ///
    /// # Errors
    ///
    /// Returns gateway errors from the session and package queries and store
    /// errors from purging, deleting or adopting records.
    pub async fn reconcile_on_startup(&self) -> Result<ReconcileReport, Error> {
        if self.is_reconciled() {
            tracing::debug!("reconciling again in the same process");
        }
        let mut report = ReconcileReport {
            purged: self.inner.store.purge_expired().await?,
            ..ReconcileReport::default()
        };
        let purged_sessions: BTreeSet<SessionId> =
            report.purged.iter().map(|r| r.session_id).collect();

        let sessions = self.inner.gateway.list_active_sessions().await?;
        let live: BTreeMap<SessionId, &PlatformSession> = sessions
            .iter()
            .filter(|session| session.active)
            .map(|session| (session.session_id, session))
            .collect();

        for record in &report.purged {
            if !live.contains_key(&record.session_id) {
                continue;
            }
            match self.inner.gateway.abandon_session(record.session_id).await {
                Ok(()) => tracing::info!(
                    item = %record.item_id,
                    session = %record.session_id,
                    "abandoned session of expired record"
                ),
                Err(e) => tracing::warn!(
                    item = %record.item_id,
                    session = %record.session_id,
                    error = %e,
                    "failed to abandon session of expired record"
                ),
            }
        }

        let records = match self.inner.store.list_active().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "session store unreadable, assuming no tracked sessions");
                Vec::new()
            }
        };

        let mut tracked = BTreeSet::new();
        for record in records {
            if live.contains_key(&record.session_id) {
                tracked.insert(record.session_id);
                continue;
            }
            let _guard = self.inner.locks.lock(&record.item_id).await;
            if let Ok(Some(current)) = self.inner.store.get_by_item(&record.item_id).await {
                if current.session_id == record.session_id {
                    self.inner.store.delete(&record.item_id).await?;
                    tracing::info!(
                        item = %record.item_id,
                        session = %record.session_id,
                        "dropped record of vanished session"
                    );
                    report.dropped.push(record);
                }
            }
        }

        let installed = self.inner.gateway.query_installed_packages().await?;
        let own_id = self.inner.gateway.installer_id().to_string();
        for (session_id, session) in live {
            if tracked.contains(&session_id) || purged_sessions.contains(&session_id) {
                continue;
            }
            if session.installer_id != own_id {
                tracing::debug!(
                    session = %session_id,
                    owner = %session.installer_id,
                    "ignoring foreign session"
                );
                report.foreign.push(session_id);
                continue;
            }
            let Some(package) = session
                .package_id
                .as_deref()
                .filter(|package| self.inner.catalog.contains(package))
            else {
                tracing::debug!(session = %session_id, "own session for no catalog item, skipped");
                continue;
            };

            let item_id = ItemId::from(package);
            let _guard = self.inner.locks.lock(&item_id).await;
            if matches!(self.inner.store.get_by_item(&item_id).await, Ok(Some(_))) {
                tracing::debug!(item = %item_id, session = %session_id, "item already tracked, not adopting");
                continue;
            }
            let kind = if installed.contains_key(package) {
                OperationKind::Upgrade
            } else {
                OperationKind::Install
            };
            let record = SessionRecord::new(item_id, session_id, kind);
            self.inner.store.put(&record).await?;
            tracing::info!(item = %record.item_id, session = %session_id, kind = %kind, "adopted untracked session");
            report.adopted.push(record);
        }

        self.inner.reconciled.store(true, Ordering::Release);
        tracing::info!(
            purged = report.purged.len(),
            dropped = report.dropped.len(),
            adopted = report.adopted.len(),
            foreign = report.foreign.len(),
            "startup reconciliation complete"
        );
        Ok(report)
    }
}
