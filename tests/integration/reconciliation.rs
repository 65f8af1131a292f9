//! Controller classification and switch election, driven directly with
//! hand-built batches so no watcher timing is involved.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use lgsync::config::Settings;
use lgsync::host::recording::{Notification, RecordingNotifier};
use lgsync::native::NativeEvent;
use lgsync::sync::{Controller, ControllerMsg};
use lgsync::watcher::WatchBatch;

use crate::common::fixtures::simple_profile;

fn controller_for(dir: &TempDir) -> (Controller<RecordingNotifier>, RecordingNotifier) {
    let mut settings = Settings {
        profiles_dir: Some(dir.path().to_path_buf()),
        ..Settings::default()
    };
    settings.set_poll_interval_ms(0);
    let recorder = RecordingNotifier::new();
    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut controller = Controller::new(settings, recorder.clone(), tx);
    controller.full_reload();
    (controller, recorder)
}

fn modified(paths: Vec<PathBuf>) -> WatchBatch {
    WatchBatch {
        modified: paths,
        ..WatchBatch::default()
    }
}

fn has_profile_list(recorder: &RecordingNotifier) -> bool {
    recorder
        .calls()
        .iter()
        .any(|n| matches!(n, Notification::ProfileList(_)))
}

#[test]
fn test_initial_load_switches_to_most_recent() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-old", "Old Game", "2024-01-01T00:00:00").write(dir.path());
    simple_profile("p-new", "New Game", "2024-02-01T00:00:00").write(dir.path());

    let (controller, recorder) = controller_for(&dir);
    assert_eq!(controller.current_guid(), Some("p-new"));
    assert_eq!(controller.last_played_guid(), Some("p-new"));
    assert_eq!(recorder.last_current_profile().unwrap(), "New Game");
}

#[test]
fn test_size_preserving_touch_is_a_selection() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    let two = simple_profile("p-2", "Game Two", "2024-01-01T00:00:00");
    let two_path = two.write(dir.path());
    let (mut controller, recorder) = controller_for(&dir);
    assert_eq!(controller.current_guid(), Some("p-1"));
    let macros_before = controller.registry()["p-2"].macros.len();
    recorder.clear();

    // Same bytes except a newer fixed-width timestamp.
    two.played_at("2024-03-01T00:00:00").write(dir.path());
    controller.apply_batch(modified(vec![two_path]));

    assert_eq!(controller.current_guid(), Some("p-2"));
    assert_eq!(controller.last_played_guid(), Some("p-2"));
    assert_eq!(recorder.last_current_profile().unwrap(), "Game Two");
    // A selection updates the timestamp in place without reloading.
    assert_eq!(controller.registry()["p-2"].macros.len(), macros_before);
    assert!(!has_profile_list(&recorder));
}

#[test]
fn test_size_changing_write_is_an_edit() {
    let dir = TempDir::new().unwrap();
    let one = simple_profile("p-1", "Game One", "2024-02-01T00:00:00");
    let one_path = one.write(dir.path());
    let (mut controller, recorder) = controller_for(&dir);
    recorder.clear();

    // Extra macro changes the byte size; content must be reloaded.
    one.keystroke_macro("p-1-m2", "Sprint")
        .keyboard_assignment("G2", 1, "p-1-m2")
        .played_at("2024-03-01T00:00:00")
        .write(dir.path());
    controller.apply_batch(modified(vec![one_path]));

    assert_eq!(controller.registry()["p-1"].macros.len(), 2);
    assert!(has_profile_list(&recorder));
}

#[test]
fn test_stale_timestamp_is_not_elected() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    let two = simple_profile("p-2", "Game Two", "2024-01-01T00:00:00");
    let two_path = two.write(dir.path());
    let (mut controller, _recorder) = controller_for(&dir);

    // Newer than its own record but older than the last-played baseline.
    two.played_at("2024-01-15T00:00:00").write(dir.path());
    controller.apply_batch(modified(vec![two_path]));

    assert_eq!(controller.current_guid(), Some("p-1"));
    assert_eq!(controller.last_played_guid(), Some("p-1"));
}

#[test]
fn test_equal_timestamps_keep_earliest_candidate() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-z", "Zed", "2024-04-01T00:00:00").write(dir.path());
    let a = simple_profile("p-a", "Alpha", "2024-01-01T00:00:00");
    let b = simple_profile("p-b", "Beta", "2024-01-01T00:00:00");
    let a_path = a.write(dir.path());
    let b_path = b.write(dir.path());
    let (mut controller, _recorder) = controller_for(&dir);
    assert_eq!(controller.current_guid(), Some("p-z"));

    // Both beat the baseline with the same timestamp; the first one in
    // batch order stays the winner.
    a.played_at("2024-05-05T05:05:05").write(dir.path());
    b.played_at("2024-05-05T05:05:05").write(dir.path());
    controller.apply_batch(modified(vec![a_path, b_path]));

    assert_eq!(controller.last_played_guid(), Some("p-a"));
    assert_eq!(controller.current_guid(), Some("p-a"));
}

#[test]
fn test_later_timestamp_wins_election() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-z", "Zed", "2024-04-01T00:00:00").write(dir.path());
    let a = simple_profile("p-a", "Alpha", "2024-01-01T00:00:00");
    let b = simple_profile("p-b", "Beta", "2024-01-01T00:00:00");
    let a_path = a.write(dir.path());
    let b_path = b.write(dir.path());
    let (mut controller, _recorder) = controller_for(&dir);
    assert_eq!(controller.current_guid(), Some("p-z"));

    // Two selections in one batch with distinct timestamps; the newer
    // one wins even when it comes first in batch order.
    a.played_at("2024-05-01T00:00:00").write(dir.path());
    b.played_at("2024-06-01T00:00:00").write(dir.path());
    controller.apply_batch(modified(vec![b_path, a_path]));

    assert_eq!(controller.last_played_guid(), Some("p-b"));
    assert_eq!(controller.current_guid(), Some("p-b"));
}

#[test]
fn test_removing_current_falls_back_to_default_profile() {
    let dir = TempDir::new().unwrap();
    let mut fallback = simple_profile("p-def", "Default Profile", "2024-01-01T00:00:00");
    fallback.last_played = None;
    fallback.write(dir.path());
    let one_path = simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    let (mut controller, recorder) = controller_for(&dir);
    assert_eq!(controller.current_guid(), Some("p-1"));

    fs::remove_file(&one_path).unwrap();
    controller.apply_batch(WatchBatch {
        removed: vec![one_path],
        ..WatchBatch::default()
    });

    assert_eq!(controller.current_guid(), Some("p-def"));
    assert!(controller.last_played_guid().is_none());
    assert!(!controller.registry().contains_key("p-1"));
    assert_eq!(recorder.last_current_profile().unwrap(), "Default Profile");
}

#[test]
fn test_native_link_suspends_selection_heuristic() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    let two = simple_profile("p-2", "Game Two", "2024-01-01T00:00:00");
    let two_path = two.write(dir.path());
    let (mut controller, recorder) = controller_for(&dir);
    recorder.clear();

    assert!(controller.handle(ControllerMsg::NativeLink(true)));
    // Size-preserving touch, but with the link up it is a plain edit.
    two.played_at("2024-03-01T00:00:00").write(dir.path());
    controller.apply_batch(modified(vec![two_path]));

    assert!(has_profile_list(&recorder));
    // The reloaded profile still wins the election on its timestamp.
    assert_eq!(controller.current_guid(), Some("p-2"));
}

#[test]
fn test_native_activation_switches_by_name() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    simple_profile("p-2", "Game Two", "2024-01-01T00:00:00").write(dir.path());
    let (mut controller, _recorder) = controller_for(&dir);

    controller.apply_native(NativeEvent::ProfileActivated {
        device: "Keyboard".into(),
        profile: "Game Two".into(),
    });
    assert_eq!(controller.current_guid(), Some("p-2"));
    assert_eq!(controller.last_played_guid(), Some("p-2"));

    // Unknown names change nothing.
    controller.apply_native(NativeEvent::ProfileActivated {
        device: "Keyboard".into(),
        profile: "Unknown".into(),
    });
    assert_eq!(controller.current_guid(), Some("p-2"));
}

#[test]
fn test_select_profile_leaves_last_played_alone() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    simple_profile("p-2", "Game Two", "2024-01-01T00:00:00").write(dir.path());
    let (mut controller, _recorder) = controller_for(&dir);

    assert!(controller.handle(ControllerMsg::SelectProfile("Game Two".into())));
    assert_eq!(controller.current_guid(), Some("p-2"));
    assert_eq!(controller.last_played_guid(), Some("p-1"));
}

#[test]
fn test_disabled_auto_switch_tracks_without_switching() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    let two = simple_profile("p-2", "Game Two", "2024-01-01T00:00:00");
    let two_path = two.write(dir.path());
    let (mut controller, _recorder) = controller_for(&dir);
    assert!(controller.handle(ControllerMsg::SetAutoSwitch(false)));

    two.played_at("2024-03-01T00:00:00").write(dir.path());
    controller.apply_batch(modified(vec![two_path]));
    assert_eq!(controller.last_played_guid(), Some("p-2"));
    assert_eq!(controller.current_guid(), Some("p-1"));

    // Re-enabling catches up to the tracked profile.
    assert!(controller.handle(ControllerMsg::SetAutoSwitch(true)));
    assert_eq!(controller.current_guid(), Some("p-2"));
}

#[test]
fn test_shift_state_change_reemits_key_values() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00")
        .keystroke_macro("p-1-m2", "Jump")
        .keyboard_assignment("G1", 2, "p-1-m2")
        .write(dir.path());
    let (mut controller, recorder) = controller_for(&dir);
    recorder.clear();

    controller.set_shift_state("Keyboard", 2);

    let calls = recorder.calls();
    assert!(calls.contains(&Notification::ShiftState {
        device: "Keyboard".into(),
        slot: 2,
    }));
    assert!(calls.contains(&Notification::KeyState {
        device: "Keyboard".into(),
        key: "G1".into(),
        slot: 2,
        value: "Jump".into(),
    }));
}
