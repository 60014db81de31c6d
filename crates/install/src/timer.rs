//! Restartable recurring tasks

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A periodic task of which at most one instance runs.
///
/// Starting the timer again aborts the previous task first, so restarts
/// never accumulate overlapping timers.
#[derive(Debug)]
pub struct RecurringTimer {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RecurringTimer {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// (Re)start with `period`; the first run happens immediately
    pub fn start<F, Fut>(&self, period: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = self.name;
        let next = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracing::trace!(timer = name, "timer fired");
                task().await;
            }
        });

        if let Ok(mut slot) = self.handle.lock() {
            if let Some(previous) = slot.replace(next) {
                previous.abort();
            }
        } else {
            next.abort();
            tracing::warn!(timer = name, "timer state poisoned, not started");
            return;
        }
        tracing::debug!(timer = name, period_secs = period.as_secs_f64(), "timer started");
    }

    pub fn stop(&self) {
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(previous) = slot.take() {
                previous.abort();
                tracing::debug!(timer = self.name, "timer stopped");
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for RecurringTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
