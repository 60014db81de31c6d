//! Startup reconciliation

use super::harness::*;
use chrono::{Duration as TtlDuration, Utc};
use sideload_platform::InstallerGateway;
use sideload_state::SessionStore;
use sideload_types::{ItemStatus, OperationKind, PlatformSession, SessionId, SessionRecord};

fn platform_session(session: i32, package: &str, installer: &str) -> PlatformSession {
    PlatformSession {
        session_id: SessionId(session),
        package_id: Some(package.to_string()),
        app_label: None,
        installer_id: installer.to_string(),
        active: true,
    }
}

#[tokio::test]
async fn test_expired_record_is_invisible_and_purged() {
    let h = harness().await;
    let stale = SessionRecord::new(id(SHOOTER), SessionId(7), OperationKind::Install)
        .with_created_at(Utc::now() - TtlDuration::hours(25));
    h.store.put(&stale).await.unwrap();
    // The abandoned session is still alive on the platform.
    h.installer
        .inject_session(platform_session(7, SHOOTER, "com.sideload.client"))
        .await
        .unwrap();

    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());

    let report = h.coordinator.reconcile_on_startup().await.unwrap();

    assert_eq!(report.purged.len(), 1);
    assert_eq!(report.purged[0].item_id, stale.item_id);
    assert_eq!(report.purged[0].session_id, SessionId(7));
    assert!(report.adopted.is_empty());
    assert!(h.store.list_active().await.unwrap().is_empty());
    assert!(h.coordinator.is_reconciled());
}

#[tokio::test]
async fn test_expired_session_is_not_adopted_on_next_startup() {
    let h = harness().await;
    let stale = SessionRecord::new(id(SHOOTER), SessionId(7), OperationKind::Install)
        .with_created_at(Utc::now() - TtlDuration::hours(25));
    h.store.put(&stale).await.unwrap();
    h.installer
        .inject_session(platform_session(7, SHOOTER, "com.sideload.client"))
        .await
        .unwrap();

    let first = h.coordinator.reconcile_on_startup().await.unwrap();
    assert_eq!(first.purged.len(), 1);
    assert!(first.adopted.is_empty());

    let sessions = h.installer.list_active_sessions().await.unwrap();
    assert!(sessions.iter().all(|s| s.session_id != SessionId(7)));

    let second = h.coordinator.reconcile_on_startup().await.unwrap();
    assert!(second.adopted.is_empty());
    assert!(second.purged.is_empty());
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_none());

    let snapshot = h.coordinator.library().snapshot().await.unwrap();
    assert_eq!(snapshot.status(SHOOTER), Some(ItemStatus::Uninstalled));
}

#[tokio::test]
async fn test_record_without_platform_session_is_dropped() {
    let h = harness().await;
    let orphan = SessionRecord::new(id(CITYMAKER), SessionId(3), OperationKind::Install);
    h.store.put(&orphan).await.unwrap();

    let report = h.coordinator.reconcile_on_startup().await.unwrap();

    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].session_id, orphan.session_id);
    assert!(h.store.get_by_item(&id(CITYMAKER)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_live_tracked_session_is_kept() {
    let h = harness().await;
    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();

    let report = h.coordinator.reconcile_on_startup().await.unwrap();

    assert!(report.is_clean());
    let record = h.store.get_by_item(&id(SHOOTER)).await.unwrap().unwrap();
    assert_eq!(record.session_id, handle.session_id);
}

#[tokio::test]
async fn test_own_sessions_are_adopted_and_foreign_ignored() {
    let h = harness().await;
    h.installer.mark_installed(CITYMAKER, 1_000).await.unwrap();
    h.installer
        .inject_session(platform_session(11, SHOOTER, "com.sideload.client"))
        .await
        .unwrap();
    h.installer
        .inject_session(platform_session(12, CITYMAKER, "com.sideload.client"))
        .await
        .unwrap();
    h.installer
        .inject_session(platform_session(13, TRANSLATOR, "com.vendor.store"))
        .await
        .unwrap();
    h.installer
        .inject_session(platform_session(14, "org.example.other", "com.sideload.client"))
        .await
        .unwrap();

    let report = h.coordinator.reconcile_on_startup().await.unwrap();

    let adopted: Vec<_> = report
        .adopted
        .iter()
        .map(|r| (r.item_id.as_str().to_string(), r.session_id, r.kind))
        .collect();
    assert_eq!(
        adopted,
        vec![
            (SHOOTER.to_string(), SessionId(11), OperationKind::Install),
            (CITYMAKER.to_string(), SessionId(12), OperationKind::Upgrade),
        ]
    );
    assert_eq!(report.foreign, vec![SessionId(13)]);
    assert!(h.store.get_by_item(&id(TRANSLATOR)).await.unwrap().is_none());

    // An adopted session is reused rather than duplicated.
    let handle = h.coordinator.begin_install(&id(SHOOTER)).await.unwrap();
    assert!(handle.reused);
    assert_eq!(handle.session_id, SessionId(11));
    assert_eq!(h.installer.created_sessions(), 0);
}

#[tokio::test]
async fn test_reconcile_fails_when_installer_unreachable() {
    let h = harness().await;
    h.installer.set_available(false).await;

    let err = h.coordinator.reconcile_on_startup().await.unwrap_err();

    assert!(err.is_gateway_unavailable());
    assert!(!h.coordinator.is_reconciled());
}
