//! Behaviour of the simulated installer

#[cfg(test)]
mod tests {
    use sideload_errors::{Error, GatewayError};
    use sideload_platform::*;
    use sideload_types::{
        CallbackTarget, FailureKind, InstallerStatus, PlatformSession, SessionId,
    };
    use std::time::Duration;
    use tempfile::tempdir;

    const ITEM: &str = "com.acme.spaceshooter";

    fn options() -> SimulatorOptions {
        SimulatorOptions {
            callback_delay: Duration::from_millis(1),
            ..SimulatorOptions::default()
        }
    }

    async fn next(rx: &mut SignalReceiver) -> PlatformSignal {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("signal within timeout")
            .expect("channel open")
    }

    async fn install(sim: &SimulatedInstaller, target: CallbackTarget) -> SessionId {
        let session = sim.create_session("Space Shooter", ITEM).await.unwrap();
        sim.open_and_write(session, Box::new(&b"apk-bytes"[..]))
            .await
            .unwrap();
        sim.commit(session, target).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_commit_reports_success_then_package_added() {
        let (tx, mut rx) = signal_channel();
        let sim = SimulatedInstaller::new(options(), tx);

        let session = install(&sim, CallbackTarget::Install).await;

        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => {
                assert_eq!(cb.session_id, session);
                assert_eq!(cb.status, InstallerStatus::Success);
                assert_eq!(cb.package_id.as_deref(), Some(ITEM));
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert_eq!(
            next(&mut rx).await,
            PlatformSignal::PackageAdded {
                package_id: ITEM.to_string()
            }
        );

        let installed = sim.query_installed_packages().await.unwrap();
        assert!(installed.contains_key(ITEM));
        assert!(sim.session_info(session).await.unwrap().is_none());
        assert_eq!(sim.created_sessions(), 1);
    }

    #[tokio::test]
    async fn test_upgrade_reports_replacing_removal() {
        let (tx, mut rx) = signal_channel();
        let sim = SimulatedInstaller::new(options(), tx);
        sim.mark_installed(ITEM, 1).await.unwrap();

        install(&sim, CallbackTarget::Upgrade).await;

        assert!(matches!(next(&mut rx).await, PlatformSignal::Installer(_)));
        assert_eq!(
            next(&mut rx).await,
            PlatformSignal::PackageRemoved {
                package_id: ITEM.to_string(),
                replacing: true
            }
        );
        assert!(matches!(next(&mut rx).await, PlatformSignal::PackageAdded { .. }));
    }

    #[tokio::test]
    async fn test_user_action_waits_for_decision() {
        let (tx, mut rx) = signal_channel();
        let sim = SimulatedInstaller::new(
            SimulatorOptions {
                require_user_action: true,
                ..options()
            },
            tx,
        );

        let session = install(&sim, CallbackTarget::Install).await;
        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => {
                assert_eq!(cb.status, InstallerStatus::PendingUserAction);
                assert!(cb.confirmation.is_some());
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert_eq!(sim.awaiting_confirmation().await, vec![session]);

        sim.reject(session).await.unwrap();
        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => {
                assert_eq!(cb.status, InstallerStatus::Failure(FailureKind::Aborted));
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert!(sim.query_installed_packages().await.unwrap().is_empty());
        assert!(sim.reject(session).await.is_err());
    }

    #[tokio::test]
    async fn test_uninstall_removes_package() {
        let (tx, mut rx) = signal_channel();
        let sim = SimulatedInstaller::new(options(), tx);
        sim.mark_installed(ITEM, 1).await.unwrap();

        sim.uninstall(ITEM, CallbackTarget::Uninstall).await.unwrap();

        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => {
                assert_eq!(cb.target, CallbackTarget::Uninstall);
                assert_eq!(cb.status, InstallerStatus::Success);
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert_eq!(
            next(&mut rx).await,
            PlatformSignal::PackageRemoved {
                package_id: ITEM.to_string(),
                replacing: false
            }
        );
    }

    #[tokio::test]
    async fn test_unavailable_rejects_requests() {
        let (tx, _rx) = signal_channel();
        let sim = SimulatedInstaller::new(options(), tx);
        sim.set_available(false).await;

        let err = sim.create_session("Space Shooter", ITEM).await.unwrap_err();
        assert!(err.is_gateway_unavailable());
        assert!(!sim.can_request_package_installs().await.unwrap());
        assert_eq!(sim.created_sessions(), 0);
    }

    #[tokio::test]
    async fn test_commit_on_abandoned_session_fails() {
        let (tx, _rx) = signal_channel();
        let sim = SimulatedInstaller::new(options(), tx);
        let session = sim.create_session("Space Shooter", ITEM).await.unwrap();
        sim.abandon_session(session).await.unwrap();

        let err = sim.commit(session, CallbackTarget::Install).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Gateway(GatewayError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_state_file_round_trip() {
        let dir = tempdir().unwrap();
        let state_file = dir.path().join("platform.json");
        let opts = SimulatorOptions {
            state_file: Some(state_file.clone()),
            ..options()
        };

        let (tx, _rx) = signal_channel();
        let sim = SimulatedInstaller::load(opts.clone(), tx).await.unwrap();
        sim.mark_installed("com.paca.nicekart", 42).await.unwrap();
        sim.inject_session(PlatformSession {
            session_id: SessionId(90),
            package_id: Some("org.other.app".to_string()),
            app_label: None,
            installer_id: "org.other.store".to_string(),
            active: true,
        })
        .await
        .unwrap();

        let (tx, _rx) = signal_channel();
        let reloaded = SimulatedInstaller::load(opts, tx).await.unwrap();
        let installed = reloaded.query_installed_packages().await.unwrap();
        assert_eq!(installed["com.paca.nicekart"].last_update_millis, 42);
        assert_eq!(reloaded.list_active_sessions().await.unwrap().len(), 1);

        let fresh = reloaded.create_session("Nice Kart", "com.paca.nicekart").await.unwrap();
        assert!(fresh.get() > 90);
    }

    #[tokio::test]
    async fn test_committed_work_completes_after_restart() {
        let dir = tempdir().unwrap();
        let opts = SimulatorOptions {
            callback_delay: Duration::from_millis(200),
            state_file: Some(dir.path().join("platform.json")),
            ..options()
        };

        let (tx, _old_rx) = signal_channel();
        let sim = SimulatedInstaller::load(opts.clone(), tx).await.unwrap();
        let session = install(&sim, CallbackTarget::Install).await;
        drop(sim);

        let (tx, mut rx) = signal_channel();
        let restarted = SimulatedInstaller::load(opts, tx).await.unwrap();

        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => {
                assert_eq!(cb.session_id, session);
                assert_eq!(cb.status, InstallerStatus::Success);
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert!(restarted.session_info(session).await.unwrap().is_none());
        assert!(restarted
            .query_installed_packages()
            .await
            .unwrap()
            .contains_key(ITEM));
    }

    #[tokio::test]
    async fn test_pending_confirmation_is_announced_after_restart() {
        let dir = tempdir().unwrap();
        let opts = SimulatorOptions {
            require_user_action: true,
            state_file: Some(dir.path().join("platform.json")),
            ..options()
        };

        let (tx, mut old_rx) = signal_channel();
        let sim = SimulatedInstaller::load(opts.clone(), tx).await.unwrap();
        let session = install(&sim, CallbackTarget::Install).await;
        assert!(matches!(
            next(&mut old_rx).await,
            PlatformSignal::Installer(cb) if cb.status == InstallerStatus::PendingUserAction
        ));
        drop(sim);

        let (tx, mut rx) = signal_channel();
        let restarted = SimulatedInstaller::load(opts, tx).await.unwrap();

        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => {
                assert_eq!(cb.session_id, session);
                assert_eq!(cb.status, InstallerStatus::PendingUserAction);
                assert!(cb.confirmation.is_some());
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert_eq!(restarted.awaiting_confirmation().await, vec![session]);

        restarted.approve(session).await.unwrap();
        match next(&mut rx).await {
            PlatformSignal::Installer(cb) => assert_eq!(cb.status, InstallerStatus::Success),
            other => panic!("unexpected signal {other:?}"),
        }
    }
}
