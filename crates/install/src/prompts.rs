//! Pending-user-action prompts
//!
//! The coordinator never approves anything itself. It forwards the
//! platform's confirmation action to the presentation layer: directly when
//! the app is in the foreground, through a notification otherwise.

use dashmap::DashMap;
use sideload_types::{CallbackTarget, ConfirmationAction, ItemId, SessionId};
use std::collections::BTreeSet;

/// Everything the UI needs to show the platform's confirmation screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub session_id: SessionId,
    pub item_id: ItemId,
    pub label: String,
    pub target: CallbackTarget,
    pub action: ConfirmationAction,
}

/// Notification posted while the app is in the background
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingNotification {
    /// First pending session of its kind
    Single(ConfirmationRequest),
    /// Several sessions of the same kind are waiting
    Summary { target: CallbackTarget, count: usize },
}

/// Presentation-layer collaborator
pub trait UserPrompter: Send + Sync {
    fn is_foreground(&self) -> bool;

    /// Surface the confirmation immediately. Must not block.
    fn show_confirmation(&self, request: ConfirmationRequest);

    /// Ask the user to come back and confirm. Must not block.
    fn post_notification(&self, notification: PendingNotification);
}

/// Prompter for processes without a UI: always background, logs only
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessPrompter;

impl UserPrompter for HeadlessPrompter {
    fn is_foreground(&self) -> bool {
        false
    }

    fn show_confirmation(&self, request: ConfirmationRequest) {
        tracing::info!(
            item = %request.item_id,
            session = %request.session_id,
            "confirmation required"
        );
    }

    fn post_notification(&self, notification: PendingNotification) {
        match notification {
            PendingNotification::Single(request) => tracing::info!(
                item = %request.item_id,
                session = %request.session_id,
                target = %request.target,
                "waiting for user confirmation"
            ),
            PendingNotification::Summary { target, count } => tracing::info!(
                target = %target,
                count,
                "several sessions waiting for user confirmation"
            ),
        }
    }
}

/// Sessions currently waiting on the user, grouped by callback target
#[derive(Debug, Default)]
pub struct PendingPrompts {
    waiting: DashMap<CallbackTarget, BTreeSet<SessionId>>,
}

impl PendingPrompts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `session` as waiting; returns how many of its kind now wait
    pub fn register(&self, target: CallbackTarget, session: SessionId) -> usize {
        let mut entry = self.waiting.entry(target).or_default();
        entry.insert(session);
        entry.len()
    }

    /// Forget `session` once it reached a terminal state
    pub fn clear(&self, session: SessionId) {
        for mut entry in self.waiting.iter_mut() {
            entry.value_mut().remove(&session);
        }
    }

    #[must_use]
    pub fn count(&self, target: CallbackTarget) -> usize {
        self.waiting.get(&target).map_or(0, |set| set.len())
    }
}
