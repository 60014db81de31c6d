//! Asynchronous re-entry points: installer callbacks and package broadcasts

use sideload_errors::{Error, InstallError};
use sideload_events::SyncEvent;
use sideload_platform::PlatformSignal;
use sideload_types::{
    CallbackTarget, FailureKind, InstallerCallback, InstallerStatus, ItemId, SessionId,
    SessionRecord,
};
use std::time::Instant;

use crate::prompts::{ConfirmationRequest, PendingNotification};
use crate::SessionCoordinator;

/// Terminal outcome carried by a callback
#[derive(Debug, Clone, Copy)]
enum Terminal {
    Success,
    Failure(FailureKind),
}

impl SessionCoordinator {
    /// Route one platform signal to its handler
    ///
    /// # Errors
    ///
    /// Only store write failures are returned; lookups that miss are benign.
    pub async fn handle_signal(&self, signal: PlatformSignal) -> Result<(), Error> {
        match signal {
            PlatformSignal::Installer(callback) => self.on_installer_callback(callback).await,
            PlatformSignal::PackageAdded { package_id } => {
                self.on_system_package_added(&ItemId::from(package_id)).await
            }
            PlatformSignal::PackageRemoved {
                package_id,
                replacing,
            } => {
                self.on_system_package_removed(&ItemId::from(package_id), replacing)
                    .await
            }
        }
    }

    /// Handle a status report for a committed session or uninstall request.
    ///
    /// Terminal statuses delete the session record and publish exactly one
    /// sync event. Duplicate deliveries miss the lookup and do nothing.
    /// Unknown status codes are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns the store error if the record cannot be deleted; no event is
    /// published in that case.
    pub async fn on_installer_callback(&self, callback: InstallerCallback) -> Result<(), Error> {
        let terminal = match callback.status {
            InstallerStatus::Unknown(code) => {
                let err = InstallError::UnexpectedStatusValue { code };
                tracing::warn!(
                    session = %callback.session_id,
                    target = %callback.target,
                    error = %err,
                    "ignoring installer callback"
                );
                return Ok(());
            }
            InstallerStatus::PendingUserAction => {
                self.on_pending_user_action(&callback).await;
                return Ok(());
            }
            InstallerStatus::Success => Terminal::Success,
            InstallerStatus::Failure(kind) => Terminal::Failure(kind),
        };

        match callback.target {
            CallbackTarget::Install | CallbackTarget::Upgrade => {
                self.settle_session(&callback, terminal).await
            }
            CallbackTarget::Uninstall => self.settle_uninstall(&callback, terminal).await,
        }
    }

    async fn on_pending_user_action(&self, callback: &InstallerCallback) {
        let session_id = callback.session_id;
        let Some(action) = callback.confirmation.clone() else {
            tracing::warn!(session = %session_id, "pending user action without a confirmation action");
            return;
        };

        let item_id = match callback.target {
            CallbackTarget::Uninstall => callback.package_id.clone().map(ItemId::from),
            CallbackTarget::Install | CallbackTarget::Upgrade => self
                .lookup_session(session_id)
                .await
                .map(|record| record.item_id)
                .or_else(|| callback.package_id.clone().map(ItemId::from)),
        };
        let Some(item_id) = item_id else {
            let err = InstallError::SessionNotFound {
                reference: format!("session {session_id}"),
            };
            tracing::debug!(error = %err, "confirmation for an unknown session");
            return;
        };

        let label = self
            .inner
            .catalog
            .get(item_id.as_str())
            .map_or_else(|| item_id.to_string(), |item| item.display_label.clone());
        let request = ConfirmationRequest {
            session_id,
            item_id,
            label,
            target: callback.target,
            action,
        };

        if self.inner.prompter.is_foreground() {
            self.inner.prompter.show_confirmation(request);
            return;
        }

        if callback.target == CallbackTarget::Uninstall {
            tracing::debug!(
                session = %session_id,
                "uninstall confirmation deferred until the app is in the foreground"
            );
            return;
        }

        let waiting = self.inner.prompts.register(callback.target, session_id);
        let notification = if waiting == 1 {
            PendingNotification::Single(request)
        } else {
            PendingNotification::Summary {
                target: callback.target,
                count: waiting,
            }
        };
        self.inner.prompter.post_notification(notification);
    }

    async fn settle_session(
        &self,
        callback: &InstallerCallback,
        terminal: Terminal,
    ) -> Result<(), Error> {
        let session_id = callback.session_id;
        let Some(record) = self.lookup_session(session_id).await else {
            let err = InstallError::SessionNotFound {
                reference: format!("session {session_id}"),
            };
            tracing::debug!(status = %callback.status, error = %err, "callback already handled");
            self.release(session_id);
            return Ok(());
        };

        let _guard = self.inner.locks.lock(&record.item_id).await;
        match self.inner.store.get_by_item(&record.item_id).await {
            Ok(Some(current)) if current.session_id == session_id => {}
            Ok(_) => {
                tracing::debug!(
                    item = %record.item_id,
                    session = %session_id,
                    "session settled concurrently"
                );
                self.release(session_id);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(item = %record.item_id, error = %e, "session lookup failed, dropping callback");
                return Ok(());
            }
        }

        self.inner.store.delete(&record.item_id).await?;
        self.release(session_id);
        self.publish_terminal(&record, callback, terminal);
        Ok(())
    }

    fn publish_terminal(
        &self,
        record: &SessionRecord,
        callback: &InstallerCallback,
        terminal: Terminal,
    ) {
        let mut labels = vec![("kind", record.kind.as_str().to_string())];
        match terminal {
            Terminal::Success => {
                self.inner
                    .settled
                    .insert(record.item_id.clone(), Instant::now());
                self.inner.bus.publish_for_session(
                    SyncEvent::install_success(record.item_id.clone()),
                    record.session_id,
                    labels,
                );
            }
            Terminal::Failure(kind) => {
                tracing::warn!(
                    item = %record.item_id,
                    session = %record.session_id,
                    failure = %kind,
                    message = callback.status_message.as_deref().unwrap_or_default(),
                    "{} failed",
                    record.kind
                );
                labels.push(("failure_kind", kind.as_str().to_string()));
                labels.push(("diagnostic", kind.describe().to_string()));
                if let Some(message) = &callback.status_message {
                    labels.push(("status_message", message.clone()));
                }
                self.inner.bus.publish_for_session(
                    SyncEvent::install_failure(record.item_id.clone()),
                    record.session_id,
                    labels,
                );
            }
        }
    }

    async fn settle_uninstall(
        &self,
        callback: &InstallerCallback,
        terminal: Terminal,
    ) -> Result<(), Error> {
        self.release(callback.session_id);
        let Some(item_id) = callback.package_id.clone().map(ItemId::from) else {
            tracing::debug!(session = %callback.session_id, "uninstall callback without a package");
            return Ok(());
        };
        if !self.inner.catalog.contains(item_id.as_str()) {
            tracing::debug!(item = %item_id, "uninstall callback for an item outside the catalog");
            return Ok(());
        }

        let _guard = self.inner.locks.lock(&item_id).await;
        match terminal {
            Terminal::Success => {
                // The system removal broadcast publishes the success event.
                if let Ok(Some(record)) = self.inner.store.get_by_item(&item_id).await {
                    self.inner.store.delete(&item_id).await?;
                    self.inner.claims.remove(&record.session_id);
                    tracing::debug!(item = %item_id, session = %record.session_id, "dropped record of uninstalled item");
                }
                tracing::info!(item = %item_id, "uninstall confirmed by the installer");
            }
            Terminal::Failure(kind) => {
                tracing::warn!(item = %item_id, failure = %kind, "uninstall failed");
                self.inner.bus.publish_with_labels(
                    SyncEvent::uninstall_failure(item_id.clone()),
                    [
                        ("failure_kind", kind.as_str().to_string()),
                        ("diagnostic", kind.describe().to_string()),
                    ],
                );
            }
        }
        Ok(())
    }

    /// Handle a system-wide package-added broadcast.
    ///
    /// A recorded session for the item is settled here; a success already
    /// published from a callback within the dedupe window suppresses the
    /// broadcast; anything else is an install made outside this client.
    ///
    /// # Errors
    ///
    /// Returns the store error if a settled record cannot be deleted.
    pub async fn on_system_package_added(&self, item_id: &ItemId) -> Result<(), Error> {
        if !self.inner.catalog.contains(item_id.as_str()) {
            tracing::trace!(item = %item_id, "ignoring package outside the catalog");
            return Ok(());
        }
        let _guard = self.inner.locks.lock(item_id).await;

        let record = match self.inner.store.get_by_item(item_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(item = %item_id, error = %e, "session lookup failed, treating as absent");
                None
            }
        };
        if let Some(record) = record {
            self.inner.store.delete(item_id).await?;
            self.release(record.session_id);
            self.inner.settled.insert(item_id.clone(), Instant::now());
            self.inner.bus.publish_for_session(
                SyncEvent::install_success(item_id.clone()),
                record.session_id,
                [("kind", record.kind.as_str()), ("via", "package_added")],
            );
            return Ok(());
        }

        if let Some((_, settled_at)) = self.inner.settled.remove(item_id) {
            if settled_at.elapsed() <= self.inner.dedupe_window {
                tracing::debug!(item = %item_id, "package added after settled session, suppressed");
                return Ok(());
            }
        }

        self.inner.bus.publish_with_labels(
            SyncEvent::install_success(item_id.clone()),
            [("via", "package_added")],
        );
        Ok(())
    }

    /// Handle a system-wide package-removed broadcast.
    ///
    /// The removal half of an in-place replace is ignored.
    pub async fn on_system_package_removed(
        &self,
        item_id: &ItemId,
        replacing: bool,
    ) -> Result<(), Error> {
        if replacing {
            tracing::debug!(item = %item_id, "package replaced in place, not an uninstall");
            return Ok(());
        }
        if !self.inner.catalog.contains(item_id.as_str()) {
            tracing::trace!(item = %item_id, "ignoring package outside the catalog");
            return Ok(());
        }
        let _guard = self.inner.locks.lock(item_id).await;
        self.inner.settled.remove(item_id);
        self.inner
            .bus
            .publish_with_labels(SyncEvent::uninstall_success(item_id.clone()), [("via", "package_removed")]);
        Ok(())
    }

    /// Reverse lookup; store errors read as absent
    async fn lookup_session(&self, session_id: SessionId) -> Option<SessionRecord> {
        match self.inner.store.get_by_session_id(session_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "session lookup failed, treating as absent");
                None
            }
        }
    }

    /// Forget commit claims and pending prompts for a finished session
    fn release(&self, session_id: SessionId) {
        self.inner.claims.remove(&session_id);
        self.inner.prompts.clear(session_id);
    }
}
