//! User-facing update settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Auto-update schedule and update-availability threshold.
///
/// Replaced as a whole; `0` means manual / none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettings {
    #[serde(default)]
    pub schedule_minutes: u32,
    #[serde(default)]
    pub staleness_minutes: u32,
}

impl UpdateSettings {
    #[must_use]
    pub fn new(schedule_minutes: u32, staleness_minutes: u32) -> Self {
        Self {
            schedule_minutes,
            staleness_minutes,
        }
    }

    /// Period of the auto-update worker, `None` when updates are manual
    #[must_use]
    pub fn schedule(&self) -> Option<Duration> {
        (self.schedule_minutes > 0).then(|| Duration::from_secs(u64::from(self.schedule_minutes) * 60))
    }

    /// Staleness threshold, `None` disables update availability entirely
    #[must_use]
    pub fn staleness(&self) -> Option<chrono::Duration> {
        (self.staleness_minutes > 0)
            .then(|| chrono::Duration::minutes(i64::from(self.staleness_minutes)))
    }

    /// Whether an install last updated at `last_update_millis` is stale at `now`
    #[must_use]
    pub fn is_stale(&self, last_update_millis: i64, now: DateTime<Utc>) -> bool {
        match self.staleness() {
            Some(threshold) if last_update_millis >= 0 => {
                now.timestamp_millis() - last_update_millis > threshold.num_milliseconds()
            }
            _ => false,
        }
    }
}
