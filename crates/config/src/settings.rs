//! Atomically replaceable update settings

use sideload_types::UpdateSettings;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to the current `UpdateSettings`.
///
/// Settings are replaced as a whole; every observer sees the new value on its
/// next `changed()` and restarts whatever depends on it.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: Arc<watch::Sender<UpdateSettings>>,
}

impl SettingsHandle {
    #[must_use]
    pub fn new(initial: UpdateSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn current(&self) -> UpdateSettings {
        *self.tx.borrow()
    }

    /// Replace the settings; returns `true` if the value changed
    pub fn replace(&self, settings: UpdateSettings) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == settings {
                false
            } else {
                *current = settings;
                true
            }
        });
        if changed {
            tracing::info!(
                schedule_minutes = settings.schedule_minutes,
                staleness_minutes = settings.staleness_minutes,
                "update settings replaced"
            );
        }
        changed
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UpdateSettings> {
        self.tx.subscribe()
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(UpdateSettings::default())
    }
}
