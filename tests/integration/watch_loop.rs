//! Polling watcher batching and lifecycle.
//!
//! All tests run with native notification off so timing depends only on
//! the poll interval, and with a guard threshold below the sleeps used
//! between mutations.

use std::fs;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tempfile::TempDir;

use lgsync::watcher::{WatchBatch, WatchEvent, Watcher, WatcherHandle};

use crate::common::fixtures::simple_profile;

const INTERVAL: Duration = Duration::from_millis(25);
const SETTLE: Duration = Duration::from_millis(150);

fn start(dir: &TempDir) -> (WatcherHandle, Receiver<WatchEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = Watcher::new(dir.path(), INTERVAL)
        .native_events(false)
        .guard_threshold(Duration::from_millis(30))
        .spawn(move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    (handle, rx)
}

fn next_batch(rx: &Receiver<WatchEvent>) -> WatchBatch {
    loop {
        match rx.recv_timeout(Duration::from_secs(5)).expect("no event") {
            WatchEvent::Batch(batch) => return batch,
            WatchEvent::Stopped => panic!("watcher stopped unexpectedly"),
        }
    }
}

#[test]
fn test_add_modify_remove_sequence() {
    crate::common::init_test_logging();
    let dir = TempDir::new().unwrap();
    let (mut handle, rx) = start(&dir);
    std::thread::sleep(SETTLE);

    let prof = simple_profile("w-1", "Watched", "2024-03-01T10:00:00");
    let path = prof.write(dir.path());
    let batch = next_batch(&rx);
    assert_eq!(batch.added, vec![path.clone()]);
    assert!(batch.modified.is_empty() && batch.removed.is_empty());

    std::thread::sleep(SETTLE);
    prof.played_at("2024-03-02T10:00:00").write(dir.path());
    let batch = next_batch(&rx);
    assert_eq!(batch.modified, vec![path.clone()]);
    assert!(batch.added.is_empty() && batch.removed.is_empty());

    std::thread::sleep(SETTLE);
    fs::remove_file(&path).unwrap();
    let batch = next_batch(&rx);
    assert_eq!(batch.removed, vec![path]);
    assert!(batch.added.is_empty() && batch.modified.is_empty());

    assert!(handle.stop(Duration::from_secs(2)));
}

#[test]
fn test_only_matching_extension_is_watched() {
    let dir = TempDir::new().unwrap();
    let (mut handle, rx) = start(&dir);
    std::thread::sleep(SETTLE);

    fs::write(dir.path().join("notes.txt"), "not a profile").unwrap();
    std::thread::sleep(SETTLE);
    assert!(rx.try_recv().is_err());

    let path = simple_profile("w-2", "Real", "2024-03-01T10:00:00").write(dir.path());
    let batch = next_batch(&rx);
    assert_eq!(batch.added, vec![path]);

    assert!(handle.stop(Duration::from_secs(2)));
}

#[test]
fn test_same_tick_additions_arrive_as_one_batch() {
    let dir = TempDir::new().unwrap();
    // A long interval so both mutations land inside one tick.
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut handle = Watcher::new(dir.path(), Duration::from_millis(400))
        .native_events(false)
        .spawn(move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

    let a = simple_profile("w-3", "A", "2024-03-01T10:00:00").write(dir.path());
    let b = simple_profile("w-4", "B", "2024-03-01T10:00:00").write(dir.path());
    let batch = next_batch(&rx);
    let mut added = batch.added.clone();
    added.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(added, expected);

    assert!(handle.stop(Duration::from_secs(2)));
}

#[test]
fn test_directory_removal_stops_watcher() {
    let outer = TempDir::new().unwrap();
    let watched = outer.path().join("profiles");
    fs::create_dir(&watched).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut handle = Watcher::new(&watched, INTERVAL)
        .native_events(false)
        .spawn(move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    std::thread::sleep(SETTLE);

    fs::remove_dir_all(&watched).unwrap();
    loop {
        match rx.recv_timeout(Duration::from_secs(5)).expect("no event") {
            WatchEvent::Stopped => break,
            WatchEvent::Batch(_) => {}
        }
    }
    assert!(handle.stop(Duration::from_secs(2)));
}

#[test]
fn test_stop_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (mut handle, _rx) = start(&dir);
    assert!(handle.stop(Duration::from_secs(2)));
    assert!(handle.stop(Duration::from_secs(2)));
}
