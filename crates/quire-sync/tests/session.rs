mod common;

use common::{Harness, applied, statuses, tick, wait};
use quire_common::storage::LocalStorage;
use quire_common::transport::CollabMessage;
use quire_editor_core::Command;
use quire_sync::{EditableState, FlushOutcome, SessionEvent, SyncStatus};

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rapid_edits_collapse_into_one_broadcast() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let alice = harness.open("alice").await;

    for text in ["a", "ab", "abc"] {
        alice.handle.edit(text).unwrap();
        wait(20).await;
    }
    wait(1000).await;

    assert_eq!(harness.hub.sent_contents(&harness.id), vec!["abc".to_string()]);
    assert_eq!(harness.persistence.save_count(), 0);

    wait(2000).await;
    assert_eq!(harness.persistence.save_count(), 1);
    assert_eq!(harness.persisted_content(), "abc");
    assert_eq!(alice.handle.status(), SyncStatus::Synchronized);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn normalized_text_is_echoed_back_after_broadcast() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let mut alice = harness.open("alice").await;

    alice.handle.edit("a\n\n\n\n\nb").unwrap();
    wait(320).await;
    assert_eq!(harness.hub.sent_contents(&harness.id), vec!["a\n\n\nb".to_string()]);
    // Still inside the suppression window.
    assert!(applied(&alice.handle.drain_events()).is_empty());

    wait(200).await;
    assert_eq!(applied(&alice.handle.drain_events()), vec!["a\n\n\nb".to_string()]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn typing_during_suppression_window_cancels_echo() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let mut alice = harness.open("alice").await;

    alice.handle.edit("a\n\n\n\n\nb").unwrap();
    wait(350).await;
    alice.handle.edit("a\n\n\n\n\nbc").unwrap();
    wait(50).await;

    let events = alice.handle.drain_events();
    assert!(!applied(&events).contains(&"a\n\n\nb".to_string()));

    wait(1000).await;
    let sent = harness.hub.sent_contents(&harness.id);
    assert_eq!(sent.last().map(String::as_str), Some("a\n\n\nbc"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edit_during_save_triggers_exactly_one_follow_up() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    harness
        .persistence
        .set_save_delay(std::time::Duration::from_millis(500));
    let mut alice = harness.open("alice").await;

    alice.handle.edit("first").unwrap();
    // Save starts at 2s and runs until 2.5s.
    wait(2200).await;
    assert_eq!(alice.handle.status(), SyncStatus::Saving);
    alice.handle.edit("first, second").unwrap();
    wait(5000).await;

    assert_eq!(
        statuses(&alice.handle.drain_events()),
        vec![
            SyncStatus::Unsynchronized,
            SyncStatus::Saving,
            SyncStatus::Unsynchronized,
            SyncStatus::Saving,
            SyncStatus::Synchronized,
        ]
    );
    let saves = harness.persistence.saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[0].1.content, "first");
    assert_eq!(saves[1].1.content, "first, second");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn remote_content_is_adopted_as_saved() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let alice = harness.open("alice").await;
    let mut bob = harness.open("bob").await;

    alice.handle.edit("hello from alice").unwrap();
    wait(500).await;

    let events = bob.handle.drain_events();
    assert_eq!(applied(&events), vec!["hello from alice".to_string()]);
    assert_eq!(bob.handle.status(), SyncStatus::Synchronized);
    assert_eq!(alice.handle.status(), SyncStatus::Unsynchronized);

    wait(3000).await;
    // Only alice saves; bob has nothing of his own to push.
    assert_eq!(harness.persistence.save_count(), 1);
    assert_eq!(bob.handle.flush(None).await, FlushOutcome::NoChanges);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn remote_cursors_follow_the_text() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let alice = harness.open("alice").await;
    let mut bob = harness.open("bob").await;

    alice.handle.edit("hello").unwrap();
    wait(500).await;
    alice.handle.move_cursor(3).unwrap();
    wait(100).await;

    let cursors = bob
        .handle
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Cursors(cursors) => Some(cursors),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].username, "alice");
    assert_eq!(cursors[0].offset, 3);
    assert_eq!(cursors[0].color, quire_editor_core::color_for_client("alice"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn malformed_payloads_are_ignored() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let mut alice = harness.open("alice").await;

    harness.hub.inject(&harness.id, b"not a message");
    tick().await;

    // The session is still alive and still adopts valid content.
    let valid = CollabMessage::Content {
        text: "from mallory".into(),
    }
    .encode(&"mallory".into())
    .unwrap();
    harness.hub.inject(&harness.id, &valid);
    tick().await;

    assert_eq!(applied(&alice.handle.drain_events()), vec!["from mallory".to_string()]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn save_command_flushes_without_waiting_for_debounce() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let alice = harness.open("alice").await;
    assert!(harness.commands.is_registered(Command::Save));

    alice.handle.edit("saved by shortcut").unwrap();
    tick().await;
    assert!(harness.commands.invoke(Command::Save, None));
    wait(100).await;

    assert_eq!(harness.persistence.save_count(), 1);
    assert_eq!(harness.persisted_content(), "saved by shortcut");

    alice.handle.unmount().await;
    assert!(!harness.commands.is_registered(Command::Save));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn metadata_edits_are_saved() {
    let harness = Harness::new(EditableState::new("Notes", "body"));
    let alice = harness.open("alice").await;

    alice.handle.set_title("Renamed").unwrap();
    alice.handle.set_tags(vec!["draft".into()]).unwrap();
    tick().await;
    assert_eq!(alice.handle.status(), SyncStatus::Unsynchronized);

    wait(2500).await;
    let saved = harness.persistence.get(&harness.id).unwrap();
    assert_eq!(saved.title, "Renamed");
    assert_eq!(saved.tags, vec![quire_editor_core::SmolStr::from("draft")]);
    assert_eq!(saved.content, "body");
    assert_eq!(alice.handle.status(), SyncStatus::Synchronized);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_save_leaves_document_unsynchronized() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let alice = harness.open("alice").await;
    harness.persistence.fail_save(true);

    alice.handle.edit("doomed").unwrap();
    tick().await;
    let outcome = alice.handle.flush(None).await;

    assert!(matches!(outcome, FlushOutcome::Failed(_)));
    assert_eq!(alice.handle.status(), SyncStatus::Unsynchronized);

    harness.persistence.fail_save(false);
    assert_eq!(alice.handle.flush(None).await, FlushOutcome::Saved);
    assert_eq!(alice.handle.status(), SyncStatus::Synchronized);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn unmount_leaves_the_room_and_clears_a_clean_cache() {
    let harness = Harness::new(EditableState::new("Notes", ""));
    let alice = harness.open("alice").await;
    assert_eq!(harness.hub.members(&harness.id), vec!["alice"]);

    alice.handle.edit("done").unwrap();
    wait(3000).await;
    assert_eq!(alice.handle.status(), SyncStatus::Synchronized);
    assert!(harness.storage.get_raw("doc:doc-1").unwrap().is_some());

    alice.handle.unmount().await;
    assert!(harness.hub.members(&harness.id).is_empty());
    assert!(harness.storage.get_raw("doc:doc-1").unwrap().is_none());
}
