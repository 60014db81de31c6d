//! Shared fixtures: a coordinator wired to the simulated installer

#![allow(dead_code)]

use chrono::Duration as TtlDuration;
use sideload_catalog::Catalog;
use sideload_config::SettingsHandle;
use sideload_events::{EventMessage, Subscription, SyncEvent, SyncEventBus};
use sideload_install::*;
use sideload_platform::{signal_channel, SignalReceiver, SimulatedInstaller, SimulatorOptions};
use sideload_state::SqliteSessionStore;
use sideload_types::{ItemId, UpdateSettings};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SHOOTER: &str = "com.acme.spaceshooter";
pub const TRANSLATOR: &str = "com.champollion.pockettranslator";
pub const CITYMAKER: &str = "com.echolabs.citymaker";

pub struct Harness {
    pub coordinator: SessionCoordinator,
    pub installer: SimulatedInstaller,
    pub store: Arc<SqliteSessionStore>,
    pub settings: SettingsHandle,
    pub events: Subscription,
    pub signals: Option<SignalReceiver>,
}

pub fn options() -> SimulatorOptions {
    SimulatorOptions {
        callback_delay: Duration::from_millis(5),
        ..SimulatorOptions::default()
    }
}

pub async fn harness() -> Harness {
    harness_with(options(), UpdateSettings::default(), None).await
}

pub async fn harness_with(
    options: SimulatorOptions,
    settings: UpdateSettings,
    prompter: Option<Arc<dyn UserPrompter>>,
) -> Harness {
    let (tx, rx) = signal_channel();
    let installer = SimulatedInstaller::new(options, tx);
    let store = Arc::new(
        SqliteSessionStore::in_memory(TtlDuration::hours(24))
            .await
            .unwrap(),
    );
    let settings = SettingsHandle::new(settings);
    let bus = SyncEventBus::new(64);
    let events = bus.subscribe();

    let mut builder = SessionCoordinator::builder()
        .with_catalog(Arc::new(Catalog::sample()))
        .with_gateway(Arc::new(installer.clone()))
        .with_store(store.clone())
        .with_event_bus(bus)
        .with_settings(settings.clone());
    if let Some(prompter) = prompter {
        builder = builder.with_prompter(prompter);
    }

    Harness {
        coordinator: builder.build().unwrap(),
        installer,
        store,
        settings,
        events,
        signals: Some(rx),
    }
}

impl Harness {
    /// Start routing platform signals into the coordinator
    pub fn run_signals(&mut self) -> tokio::task::JoinHandle<()> {
        let signals = self.signals.take().expect("signal loop started once");
        self.coordinator.spawn_signal_loop(signals)
    }

    pub async fn next_event(&mut self) -> EventMessage {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("event within timeout")
            .expect("bus open")
    }

    /// Everything published within `quiet` from now
    pub async fn drain(&mut self, quiet: Duration) -> Vec<SyncEvent> {
        tokio::time::sleep(quiet).await;
        let mut events = Vec::new();
        while let Some(message) = self.events.try_recv() {
            events.push(message.event);
        }
        events
    }
}

pub fn id(raw: &str) -> ItemId {
    ItemId::from(raw)
}

pub fn payloads() -> MemoryPayloadSource {
    MemoryPayloadSource::new().with_fallback(b"apk-bytes".to_vec())
}

/// Prompter that records what it was asked to show
#[derive(Default)]
pub struct RecordingPrompter {
    pub foreground: bool,
    pub shown: Mutex<Vec<ConfirmationRequest>>,
    pub posted: Mutex<Vec<PendingNotification>>,
}

impl RecordingPrompter {
    pub fn new(foreground: bool) -> Self {
        Self {
            foreground,
            ..Self::default()
        }
    }

    pub fn shown(&self) -> Vec<ConfirmationRequest> {
        self.shown.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<PendingNotification> {
        self.posted.lock().unwrap().clone()
    }
}

impl UserPrompter for RecordingPrompter {
    fn is_foreground(&self) -> bool {
        self.foreground
    }

    fn show_confirmation(&self, request: ConfirmationRequest) {
        self.shown.lock().unwrap().push(request);
    }

    fn post_notification(&self, notification: PendingNotification) {
        self.posted.lock().unwrap().push(notification);
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
