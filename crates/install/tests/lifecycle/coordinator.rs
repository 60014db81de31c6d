//! Coordinator operations and callback handling

use super::harness::*;
use async_trait::async_trait;
use sideload_errors::{Error, InstallError, StorageError};
use sideload_events::{SyncEvent, SyncEventBus, SyncEventType};
use sideload_install::*;
use sideload_platform::{signal_channel, InstallerGateway, SimulatedInstaller, SimulatorOptions};
use sideload_state::SessionStore;
use sideload_types::{
    CallbackTarget, FailureKind, InstallerCallback, InstallerStatus, ItemId, ItemStatus,
    OperationKind, SessionId, SessionRecord, UpdateSettings,
};
use std::sync::Arc;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(100);

#[tokio::test]
async fn test_begin_install_publishes_installing_before_payload() {
    let mut h = harness().await;

    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();

    assert!(!handle.reused);
    assert_eq!(handle.kind, OperationKind::Install);
    let message = h.next_event().await;
    assert_eq!(message.event, SyncEvent::installing(SHOOTER));
    assert_eq!(message.meta.label("kind"), Some("install"));
    let session = handle.session_id.to_string();
    assert_eq!(message.meta.correlation_id.as_deref(), Some(session.as_str()));

    let record = h.store.get_by_item(&id(SHOOTER)).await.unwrap().unwrap();
    assert_eq!(record.session_id, handle.session_id);
    assert_eq!(h.installer.created_sessions(), 1);
}

#[tokio::test]
async fn test_concurrent_begin_install_opens_one_session() {
    let mut h = harness().await;
    let item = id(SHOOTER);

    let (first, second) = tokio::join!(
        h.coordinator.begin_install(&item),
        h.coordinator.begin_install(&item)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.session_id, second.session_id);
    assert!(first.reused != second.reused);
    assert_eq!(h.installer.created_sessions(), 1);
    assert_eq!(h.store.list_active().await.unwrap().len(), 1);

    let events = h.drain(QUIET).await;
    assert_eq!(events, vec![SyncEvent::installing(SHOOTER)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_callers_share_one_session() {
    let h = harness().await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.begin_install(&id(SHOOTER)).await })
        })
        .collect();
    let handles = futures::future::join_all(tasks).await;

    let sessions: std::collections::BTreeSet<SessionId> = handles
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().session_id)
        .collect();
    assert_eq!(sessions.len(), 1);
    assert_eq!(h.installer.created_sessions(), 1);
}

#[tokio::test]
async fn test_fresh_install_scenario() {
    let mut h = harness().await;
    h.run_signals();

    let outcome = h
        .coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    assert!(matches!(outcome, InstallOutcome::Committed { bytes: 9, .. }));

    assert_eq!(h.next_event().await.event, SyncEvent::installing(SHOOTER));
    assert_eq!(h.next_event().await.event, SyncEvent::install_success(SHOOTER));

    // The package-added broadcast following the callback is suppressed.
    assert!(h.drain(QUIET).await.is_empty());
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());

    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    assert_eq!(snapshot.status(SHOOTER), Some(ItemStatus::Installed));
}

#[tokio::test]
async fn test_storage_failure_restores_uninstalled() {
    let mut options = options();
    options.outcome = InstallerStatus::Failure(FailureKind::Storage);
    let mut h = harness_with(options, UpdateSettings::default(), None).await;
    h.run_signals();

    h.coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();

    assert_eq!(h.next_event().await.event, SyncEvent::installing(SHOOTER));
    let failure = h.next_event().await;
    assert_eq!(failure.event, SyncEvent::install_failure(SHOOTER));
    assert_eq!(failure.meta.label("failure_kind"), Some("storage"));
    assert_eq!(
        failure.meta.label("diagnostic"),
        Some(FailureKind::Storage.describe())
    );

    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());
    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    assert_eq!(snapshot.status(SHOOTER), Some(ItemStatus::Uninstalled));
}

#[tokio::test]
async fn test_missing_payload_opens_no_session() {
    let mut h = harness().await;
    h.run_signals();

    let err = h
        .coordinator
        .install_from(&id(SHOOTER), &MemoryPayloadSource::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Install(InstallError::PayloadNotFound { .. })
    ));
    assert_eq!(h.installer.created_sessions(), 0);
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());
    assert!(h.drain(QUIET).await.is_empty());
    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    assert_eq!(snapshot.status(SHOOTER), Some(ItemStatus::Uninstalled));
}

#[tokio::test]
async fn test_duplicate_success_callback_publishes_once() {
    let mut h = harness().await;
    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();
    let callback = InstallerCallback::new(
        handle.session_id,
        CallbackTarget::Install,
        InstallerStatus::Success,
    );

    h.coordinator
        .on_installer_callback(callback.clone())
        .await
        .unwrap();
    h.coordinator.on_installer_callback(callback).await.unwrap();

    let events = h.drain(QUIET).await;
    assert_eq!(
        events,
        vec![
            SyncEvent::installing(SHOOTER),
            SyncEvent::install_success(SHOOTER)
        ]
    );
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_status_is_ignored() {
    let mut h = harness().await;
    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();
    h.next_event().await;

    h.coordinator
        .on_installer_callback(InstallerCallback::new(
            handle.session_id,
            CallbackTarget::Install,
            InstallerStatus::from_code(42),
        ))
        .await
        .unwrap();

    assert!(h.drain(QUIET).await.is_empty());
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_callback_for_unknown_session_is_benign() {
    let mut h = harness().await;

    h.coordinator
        .on_installer_callback(InstallerCallback::new(
            SessionId(999),
            CallbackTarget::Install,
            InstallerStatus::Failure(FailureKind::Generic),
        ))
        .await
        .unwrap();

    assert!(h.drain(QUIET).await.is_empty());
}

#[tokio::test]
async fn test_gateway_unavailable_publishes_nothing() {
    let mut h = harness().await;
    h.installer.set_available(false).await;

    let err = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap_err();

    assert!(err.is_gateway_unavailable());
    assert!(h.drain(QUIET).await.is_empty());
    assert!(h.store.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_item_is_rejected() {
    let h = harness().await;
    let err = h
        .coordinator
        .begin_install(&id("org.example.missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Install(InstallError::UnknownItem { .. })));
    assert_eq!(h.installer.created_sessions(), 0);
}

#[tokio::test]
async fn test_installed_item_without_update_is_rejected() {
    let h = harness().await;
    h.installer
        .mark_installed(SHOOTER, sideload_types::now_millis())
        .await
        .unwrap();

    let err = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::AlreadyInstalled { .. })
    ));
}

#[tokio::test]
async fn test_upgrade_flow_publishes_one_success() {
    let mut h = harness_with(options(), UpdateSettings::new(0, 1), None).await;
    h.installer.mark_installed(SHOOTER, 1_000).await.unwrap();
    h.run_signals();

    let outcome = h
        .coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    assert_eq!(outcome.handle().kind, OperationKind::Upgrade);
    assert_eq!(outcome.handle().callback_target(), CallbackTarget::Upgrade);

    let installing = h.next_event().await;
    assert_eq!(installing.meta.label("kind"), Some("upgrade"));
    assert_eq!(h.next_event().await.event, SyncEvent::install_success(SHOOTER));
    // Neither the replacing removal nor the re-add produce events.
    assert!(h.drain(QUIET).await.is_empty());

    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    let entry = snapshot.get(SHOOTER).unwrap();
    assert_eq!(entry.state.status, ItemStatus::Installed);
    assert!(!entry.state.update_available);
}

#[tokio::test]
async fn test_upgrade_failure_keeps_item_installed() {
    let mut options = options();
    options.outcome = InstallerStatus::Failure(FailureKind::Incompatible);
    let mut h = harness_with(options, UpdateSettings::new(0, 1), None).await;
    h.installer.mark_installed(SHOOTER, 1_000).await.unwrap();
    h.run_signals();

    h.coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    h.next_event().await;
    assert_eq!(h.next_event().await.event, SyncEvent::install_failure(SHOOTER));

    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    assert_eq!(snapshot.status(SHOOTER), Some(ItemStatus::Installed));
}

#[tokio::test]
async fn test_vanished_session_is_replaced() {
    let h = harness().await;
    let first = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();
    h.installer.abandon_session(first.session_id).await.unwrap();

    let second = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();

    assert!(!second.reused);
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(h.installer.created_sessions(), 2);
    let record = h.store.get_by_item(&id(SHOOTER)).await.unwrap().unwrap();
    assert_eq!(record.session_id, second.session_id);
}

#[tokio::test]
async fn test_failed_commit_is_retried_on_the_same_session() {
    let h = harness().await;
    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();

    h.installer.set_available(false).await;
    let err = h
        .coordinator
        .write_and_commit(&handle, Box::new(&b"apk"[..]))
        .await
        .unwrap_err();
    assert!(err.is_gateway_unavailable());

    h.installer.set_available(true).await;
    let outcome = h
        .coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();

    assert!(outcome.handle().reused);
    assert_eq!(outcome.handle().session_id, handle.session_id);
    assert!(matches!(outcome, InstallOutcome::Committed { .. }));
    assert_eq!(h.installer.created_sessions(), 1);
}

#[tokio::test]
async fn test_second_commit_of_same_session_is_in_progress() {
    let mut options = options();
    options.require_user_action = true;
    let h = harness_with(options, UpdateSettings::default(), None).await;

    let first = h
        .coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    let second = h
        .coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();

    assert!(matches!(first, InstallOutcome::Committed { .. }));
    assert!(matches!(second, InstallOutcome::AlreadyInProgress { .. }));
    assert_eq!(h.installer.created_sessions(), 1);
}

#[tokio::test]
async fn test_replacing_removal_is_not_an_uninstall() {
    let mut h = harness().await;

    h.coordinator
        .on_system_package_removed(&id(SHOOTER), true)
        .await
        .unwrap();
    assert!(h.drain(QUIET).await.is_empty());

    h.coordinator
        .on_system_package_removed(&id(SHOOTER), false)
        .await
        .unwrap();
    assert_eq!(
        h.drain(QUIET).await,
        vec![SyncEvent::uninstall_success(SHOOTER)]
    );
}

#[tokio::test]
async fn test_broadcasts_outside_catalog_are_ignored() {
    let mut h = harness().await;

    h.coordinator
        .on_system_package_added(&id("org.example.other"))
        .await
        .unwrap();
    h.coordinator
        .on_system_package_removed(&id("org.example.other"), false)
        .await
        .unwrap();

    assert!(h.drain(QUIET).await.is_empty());
}

#[tokio::test]
async fn test_out_of_band_install_publishes_success() {
    let mut h = harness().await;

    h.coordinator
        .on_system_package_added(&id(CITYMAKER))
        .await
        .unwrap();

    assert_eq!(
        h.drain(QUIET).await,
        vec![SyncEvent::install_success(CITYMAKER)]
    );
}

#[tokio::test]
async fn test_package_added_settles_recorded_session() {
    let mut h = harness().await;
    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();

    h.coordinator
        .on_system_package_added(&id(SHOOTER))
        .await
        .unwrap();
    h.coordinator
        .on_installer_callback(InstallerCallback::new(
            handle.session_id,
            CallbackTarget::Install,
            InstallerStatus::Success,
        ))
        .await
        .unwrap();

    let events = h.drain(QUIET).await;
    let successes = events
        .iter()
        .filter(|e| e.kind == SyncEventType::InstallSuccess)
        .count();
    assert_eq!(successes, 1);
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_uninstall_flow() {
    let mut h = harness().await;
    h.installer.mark_installed(TRANSLATOR, 5_000).await.unwrap();
    h.run_signals();

    h.coordinator.uninstall(&id(TRANSLATOR)).await.unwrap();

    assert_eq!(
        h.next_event().await.event,
        SyncEvent::uninstall_success(TRANSLATOR)
    );
    assert!(h.drain(QUIET).await.is_empty());
    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    assert_eq!(snapshot.status(TRANSLATOR), Some(ItemStatus::Uninstalled));
}

#[tokio::test]
async fn test_uninstall_failure_publishes_failure() {
    let mut options = options();
    options.outcome = InstallerStatus::Failure(FailureKind::Blocked);
    let mut h = harness_with(options, UpdateSettings::default(), None).await;
    h.installer.mark_installed(TRANSLATOR, 5_000).await.unwrap();
    h.run_signals();

    h.coordinator.uninstall(&id(TRANSLATOR)).await.unwrap();

    let message = h.next_event().await;
    assert_eq!(message.event, SyncEvent::uninstall_failure(TRANSLATOR));
    assert_eq!(message.meta.label("failure_kind"), Some("blocked"));
}

#[tokio::test]
async fn test_uninstall_of_missing_package_fails() {
    let h = harness().await;
    let err = h.coordinator.uninstall(&id(TRANSLATOR)).await.unwrap_err();
    assert!(matches!(err, Error::Install(InstallError::NotInstalled { .. })));
}

#[tokio::test]
async fn test_open_app_passes_through() {
    let h = harness().await;
    assert!(h.coordinator.open_app(&id(SHOOTER)).await.is_err());

    h.installer.mark_installed(SHOOTER, 1).await.unwrap();
    h.coordinator.open_app(&id(SHOOTER)).await.unwrap();
    assert!(h.coordinator.can_request_package_installs().await.unwrap());
}

#[tokio::test]
async fn test_builder_requires_components() {
    let err = SessionCoordinator::builder().build().unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::MissingComponent { .. })
    ));
}

/// Store whose writes always fail
struct ReadOnlyStore;

#[async_trait]
impl SessionStore for ReadOnlyStore {
    async fn put(&self, _record: &SessionRecord) -> Result<(), Error> {
        Err(StorageError::Database {
            message: "attempt to write a readonly database".to_string(),
        }
        .into())
    }

    async fn get_by_item(&self, _item_id: &ItemId) -> Result<Option<SessionRecord>, Error> {
        Ok(None)
    }

    async fn get_by_session_id(
        &self,
        _session_id: SessionId,
    ) -> Result<Option<SessionRecord>, Error> {
        Ok(None)
    }

    async fn delete(&self, _item_id: &ItemId) -> Result<bool, Error> {
        Ok(false)
    }

    async fn list_active(&self) -> Result<Vec<SessionRecord>, Error> {
        Ok(Vec::new())
    }

    async fn purge_expired(&self) -> Result<Vec<SessionRecord>, Error> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_store_write_failure_is_surfaced() {
    let (tx, _rx) = signal_channel();
    let installer = SimulatedInstaller::new(SimulatorOptions::default(), tx);
    let bus = SyncEventBus::default();
    let mut events = bus.subscribe();
    let coordinator = SessionCoordinator::builder()
        .with_catalog(Arc::new(sideload_catalog::Catalog::sample()))
        .with_gateway(Arc::new(installer.clone()))
        .with_store(Arc::new(ReadOnlyStore))
        .with_event_bus(bus)
        .build()
        .unwrap();

    let err = coordinator.begin_install(&id(SHOOTER)).await.unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::Database { .. })));
    assert!(events.try_recv().is_none());
    // The platform session exists but is untracked until the next startup.
    let live = installer.list_active_sessions().await.unwrap();
    assert_eq!(live.len(), 1);
}
