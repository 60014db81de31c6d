//! Pending-user-action routing

use super::harness::*;
use sideload_events::SyncEvent;
use sideload_install::*;
use sideload_state::SessionStore;
use sideload_types::{CallbackTarget, ConfirmationAction, UpdateSettings};
use std::sync::Arc;
use std::time::Duration;

async fn confirming(prompter: Arc<RecordingPrompter>) -> Harness {
    let mut options = options();
    options.require_user_action = true;
    let prompter: Arc<dyn UserPrompter> = prompter;
    let mut h = harness_with(options, UpdateSettings::default(), Some(prompter)).await;
    h.run_signals();
    h
}

#[tokio::test]
async fn test_foreground_shows_confirmation_and_never_approves() {
    let prompter = Arc::new(RecordingPrompter::new(true));
    let mut h = confirming(prompter.clone()).await;

    let outcome = h
        .coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    let session = outcome.handle().session_id;

    let waiting = prompter.clone();
    eventually(move || {
        let waiting = waiting.clone();
        async move { !waiting.shown().is_empty() }
    })
    .await;

    let shown = prompter.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].item_id, id(SHOOTER));
    assert_eq!(shown[0].label, "Space Shooter");
    assert_eq!(shown[0].target, CallbackTarget::Install);
    assert_eq!(
        shown[0].action,
        ConfirmationAction(format!("sideload://confirm/{session}"))
    );
    assert!(prompter.posted().is_empty());

    // Nothing completes until the user answers.
    let events = h.drain(Duration::from_millis(100)).await;
    assert_eq!(events, vec![SyncEvent::installing(SHOOTER)]);
    assert!(h.store.get_by_item(&id(SHOOTER)).await.unwrap().is_some());

    h.installer.reject(session).await.unwrap();
    let failure = h.next_event().await;
    assert_eq!(failure.event, SyncEvent::install_failure(SHOOTER));
    assert_eq!(failure.meta.label("failure_kind"), Some("aborted"));
}

#[tokio::test]
async fn test_background_prompts_are_grouped() {
    let prompter = Arc::new(RecordingPrompter::new(false));
    let mut h = confirming(prompter.clone()).await;

    h.coordinator
        .install_from(&id(SHOOTER), &payloads())
        .await
        .unwrap();
    h.coordinator
        .install_from(&id(CITYMAKER), &payloads())
        .await
        .unwrap();

    let waiting = prompter.clone();
    eventually(move || {
        let waiting = waiting.clone();
        async move { waiting.posted().len() == 2 }
    })
    .await;

    let posted = prompter.posted();
    assert!(matches!(&posted[0], PendingNotification::Single(request) if request.target == CallbackTarget::Install));
    assert_eq!(
        posted[1],
        PendingNotification::Summary {
            target: CallbackTarget::Install,
            count: 2
        }
    );
    assert!(prompter.shown().is_empty());

    for session in h.installer.awaiting_confirmation().await {
        h.installer.approve(session).await.unwrap();
    }
    let mut successes = 0;
    while successes < 2 {
        if h.next_event().await.event.kind == sideload_events::SyncEventType::InstallSuccess {
            successes += 1;
        }
    }
}

#[tokio::test]
async fn test_background_uninstall_waits_for_foreground() {
    let prompter = Arc::new(RecordingPrompter::new(false));
    let h = confirming(prompter.clone()).await;
    h.installer.mark_installed(TRANSLATOR, 1_000).await.unwrap();

    h.coordinator.uninstall(&id(TRANSLATOR)).await.unwrap();

    let installer = h.installer.clone();
    eventually(move || {
        let installer = installer.clone();
        async move { !installer.awaiting_confirmation().await.is_empty() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(prompter.posted().is_empty());
    assert!(prompter.shown().is_empty());
}
