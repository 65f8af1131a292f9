//! Full service runs: watcher, controller and native adapter wired the
//! way the binary wires them, observed through a recording notifier.

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use lgsync::config::Settings;
use lgsync::host::recording::{Notification, RecordingNotifier};
use lgsync::native::{ChannelSource, NativeAdapter};
use lgsync::sync::SyncService;

use crate::common::fixtures::simple_profile;

const WAIT: Duration = Duration::from_secs(5);

fn fast_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings {
        profiles_dir: Some(dir.path().to_path_buf()),
        // Polling only keeps the timing deterministic across platforms.
        native_fs_events: false,
        ..Settings::default()
    };
    settings.set_poll_interval_ms(25);
    settings
}

#[test]
fn test_service_switches_on_selection_and_removal() {
    crate::common::init_test_logging();
    let dir = TempDir::new().unwrap();
    let one = simple_profile("p-1", "Game One", "2024-02-01T00:00:00");
    one.write(dir.path());
    let two = simple_profile("p-2", "Game Two", "2024-01-01T00:00:00");
    let two_path = two.write(dir.path());
    simple_profile("p-def", "Default Profile", "2020-01-01T00:00:00").write(dir.path());

    let recorder = RecordingNotifier::new();
    let handle = SyncService::start(fast_settings(&dir), recorder.clone()).unwrap();

    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::CurrentProfile("Game One".into())
    }));
    std::thread::sleep(Duration::from_millis(150));
    recorder.clear();

    // Size-preserving timestamp bump: a selection in the other program.
    two.played_at("2024-03-01T00:00:00").write(dir.path());
    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::CurrentProfile("Game Two".into())
    }));

    std::thread::sleep(Duration::from_millis(150));
    recorder.clear();
    fs::remove_file(&two_path).unwrap();
    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::CurrentProfile("Default Profile".into())
    }));

    assert!(handle.shutdown(WAIT));
}

#[test]
fn test_service_reports_new_profiles() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());

    let recorder = RecordingNotifier::new();
    let handle = SyncService::start(fast_settings(&dir), recorder.clone()).unwrap();
    assert!(recorder.wait_for(WAIT, |n| {
        matches!(n, Notification::ProfileList(names) if names == &vec!["Game One".to_string()])
    }));
    std::thread::sleep(Duration::from_millis(150));

    simple_profile("p-2", "Game Two", "2024-01-01T00:00:00").write(dir.path());
    assert!(recorder.wait_for(WAIT, |n| {
        matches!(
            n,
            Notification::ProfileList(names)
                if names == &vec!["Game One".to_string(), "Game Two".to_string()]
        )
    }));

    assert!(handle.shutdown(WAIT));
}

#[test]
fn test_native_adapter_drives_the_service() {
    let dir = TempDir::new().unwrap();
    simple_profile("p-1", "Game One", "2024-02-01T00:00:00").write(dir.path());
    simple_profile("p-2", "Game Two", "2024-01-01T00:00:00").write(dir.path());

    let recorder = RecordingNotifier::new();
    let mut handle = SyncService::start(fast_settings(&dir), recorder.clone()).unwrap();
    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::CurrentProfile("Game One".into())
    }));

    let (event_tx, event_rx) = crossbeam_channel::unbounded::<String>();
    let adapter = NativeAdapter::new(Box::new(ChannelSource::new(event_rx)));
    assert!(!handle.set_native_filter(vec![]));
    handle.attach_native(adapter).unwrap();
    assert!(handle.set_native_filter(vec![
        "profile".into(),
        "mstate".into(),
        "keydown".into(),
        "keyup".into(),
    ]));

    event_tx
        .send("profile.Keyboard.Game Two".to_string())
        .unwrap();
    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::CurrentProfile("Game Two".into())
    }));

    event_tx.send("mstate.Keyboard.2".to_string()).unwrap();
    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::ShiftState {
            device: "Keyboard".into(),
            slot: 2,
        }
    }));

    event_tx.send("keydown.Keyboard.G5".to_string()).unwrap();
    assert!(recorder.wait_for(WAIT, |n| {
        n == &Notification::Button {
            device: "Keyboard".into(),
            key: "G5".into(),
            pressed: true,
        }
    }));

    assert!(handle.shutdown(WAIT));
}

#[test]
fn test_start_rejects_missing_directory() {
    let settings = Settings {
        profiles_dir: Some(std::path::PathBuf::from("/nonexistent/profiles")),
        ..Settings::default()
    };
    let result = SyncService::start(settings, RecordingNotifier::new());
    assert!(matches!(
        result,
        Err(lgsync::LgsError::ProfilesDirNotFound { .. })
    ));
}
