//! Process runtime: projection, timers and shutdown

use super::harness::*;
use sideload_events::{SyncEvent, SyncEventType};
use sideload_install::*;
use sideload_platform::PlatformSignal;
use sideload_types::{ItemStatus, PlatformSession, SessionId, UpdateSettings};
use std::sync::Arc;
use std::time::Duration;

async fn start(h: &mut Harness) -> InstallerRuntime {
    let signals = h.signals.take().unwrap();
    InstallerRuntime::start(
        h.coordinator.clone(),
        signals,
        Arc::new(payloads()),
        RuntimeOptions::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_projection_follows_install() {
    let mut h = harness().await;
    let runtime = start(&mut h).await;
    assert!(runtime.report().is_clean());
    assert_eq!(
        runtime.projection().current().status(SHOOTER),
        Some(ItemStatus::Uninstalled)
    );

    let mut library = runtime.library();
    runtime
        .coordinator()
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if library.borrow_and_update().status(SHOOTER) == Some(ItemStatus::Installed) {
                break;
            }
            library.changed().await.unwrap();
        }
    })
    .await
    .expect("projection reached Installed");

    runtime.shutdown();
}

#[tokio::test]
async fn test_startup_adopts_orphaned_session() {
    let mut h = harness().await;
    h.installer
        .inject_session(PlatformSession {
            session_id: SessionId(21),
            package_id: Some(CITYMAKER.to_string()),
            app_label: Some("City Maker".to_string()),
            installer_id: "com.sideload.client".to_string(),
            active: true,
        })
        .await
        .unwrap();

    let runtime = start(&mut h).await;

    assert_eq!(runtime.report().adopted.len(), 1);
    assert_eq!(
        runtime.projection().current().status(CITYMAKER),
        Some(ItemStatus::Installing)
    );
}

#[tokio::test]
async fn test_settings_change_restarts_auto_update() {
    let mut h = harness().await;
    let runtime = start(&mut h).await;
    assert!(!runtime.scheduler().is_auto_update_running());

    h.settings.replace(UpdateSettings::new(60, 0));
    let scheduler = runtime.scheduler().clone();
    eventually(move || {
        let scheduler = scheduler.clone();
        async move { scheduler.is_auto_update_running() }
    })
    .await;

    h.settings.replace(UpdateSettings::new(0, 0));
    let scheduler = runtime.scheduler().clone();
    eventually(move || {
        let scheduler = scheduler.clone();
        async move { !scheduler.is_auto_update_running() }
    })
    .await;
}

#[tokio::test]
async fn test_runtime_without_timers_never_schedules_auto_update() {
    let mut h = harness_with(options(), UpdateSettings::new(60, 0), None).await;
    let signals = h.signals.take().unwrap();
    let runtime = InstallerRuntime::start(
        h.coordinator.clone(),
        signals,
        Arc::new(payloads()),
        RuntimeOptions::default().without_timers(),
    )
    .await
    .unwrap();
    assert!(!runtime.scheduler().is_auto_update_running());

    h.settings.replace(UpdateSettings::new(30, 0));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!runtime.scheduler().is_auto_update_running());

    // Signals are still processed.
    runtime
        .coordinator()
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    let mut library = runtime.library();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if library.borrow_and_update().status(SHOOTER) == Some(ItemStatus::Installed) {
                break;
            }
            library.changed().await.unwrap();
        }
    })
    .await
    .expect("projection reached Installed");
}

#[tokio::test]
async fn test_auto_update_upgrades_stale_items() {
    let mut h = harness_with(options(), UpdateSettings::new(0, 1), None).await;
    h.installer.mark_installed(SHOOTER, 1_000).await.unwrap();
    h.installer
        .mark_installed(CITYMAKER, sideload_types::now_millis())
        .await
        .unwrap();
    let runtime = start(&mut h).await;

    let report = runtime.scheduler().run_auto_update().await.unwrap();

    assert_eq!(report.started, vec![id(SHOOTER)]);
    assert!(report.failed.is_empty());
    loop {
        let message = h.next_event().await;
        if message.event.kind == SyncEventType::InstallSuccess {
            assert_eq!(message.event.item_id, id(SHOOTER));
            assert_eq!(message.meta.label("kind"), Some("upgrade"));
            break;
        }
    }
}

#[tokio::test]
async fn test_shutdown_stops_signal_processing() {
    let mut h = harness().await;
    let runtime = start(&mut h).await;
    runtime.shutdown();
    tokio::task::yield_now().await;

    h.installer.emit(PlatformSignal::PackageAdded {
        package_id: CITYMAKER.to_string(),
    });

    let events: Vec<SyncEvent> = h.drain(Duration::from_millis(100)).await;
    assert!(events.is_empty());
}
