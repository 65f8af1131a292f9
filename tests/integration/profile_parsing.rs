//! Parser behavior over generated fixture files.

use tempfile::TempDir;

use lgsync::profile::{self, device_layout, slot_key};

use crate::common::fixtures::{simple_profile, ProfileXml};

fn kbd() -> Vec<String> {
    vec!["Keyboard".to_string()]
}

#[test]
fn test_generated_profile_parses_fully() {
    let dir = TempDir::new().unwrap();
    let path = ProfileXml::new("game-1", "My Game")
        .played_at("2024-03-01T10:00:00")
        .description("M1:Combat;M2:Build")
        .target(r"C:\Games\game.exe")
        .keystroke_macro("m-1", "Reload")
        .keystroke_macro("m-2", "Jump")
        .keyboard_assignment("G1", 1, "m-1")
        .keyboard_assignment("G1", 2, "m-2")
        .write(dir.path());

    let prof = profile::parse_full(&path, &kbd()).unwrap();
    assert_eq!(prof.name, "My Game");
    assert_eq!(prof.targets, vec![r"C:\Games\game.exe"]);
    assert_eq!(prof.macros.len(), 2);

    // Same key, different memory slot.
    assert_eq!(
        prof.macro_for_key("Keyboard", &slot_key("G1", 1)).unwrap().name,
        "Reload"
    );
    assert_eq!(
        prof.macro_for_key("Keyboard", &slot_key("G1", 2)).unwrap().name,
        "Jump"
    );
    assert!(prof.macro_for_key("Keyboard", &slot_key("G2", 1)).is_none());
}

#[test]
fn test_state_names_merge_for_device() {
    let dir = TempDir::new().unwrap();
    let path = ProfileXml::new("game-2", "Named Slots")
        .played_at("2024-03-01T10:00:00")
        .description("kbd.M1:Combat;M2:Build")
        .write(dir.path());

    let prof = profile::parse_full(&path, &kbd()).unwrap();
    let layout = device_layout("Keyboard").unwrap();
    let names = prof.state_names_for("Keyboard", layout.slots);

    // Device-specific beats generic, generic beats the M<n> default.
    assert_eq!(names[&1], "Combat");
    assert_eq!(names[&2], "Build");
    assert_eq!(names[&3], "M3");
}

#[test]
fn test_unfiltered_device_block_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = ProfileXml::new("game-3", "Mouse Game")
        .played_at("2024-03-01T10:00:00")
        .keystroke_macro("m-1", "Fire")
        .assignment("Logitech.Gaming.Mouse.G700s", "Button9", 1, "m-1")
        .write(dir.path());

    let kbd_only = profile::parse_full(&path, &kbd()).unwrap();
    assert!(kbd_only.assignments.is_empty());

    let both = profile::parse_full(
        &path,
        &["Keyboard".to_string(), "Mouse".to_string()],
    )
    .unwrap();
    assert!(both.assignments.contains_key("Mouse"));
}

#[test]
fn test_parse_dir_keys_by_guid_and_survives_bad_files() {
    let dir = TempDir::new().unwrap();
    simple_profile("game-a", "Alpha", "2024-01-01T00:00:00").write(dir.path());
    simple_profile("game-b", "Beta", "2024-02-01T00:00:00").write(dir.path());
    std::fs::write(dir.path().join("junk.xml"), "<profiles><profile").unwrap();

    let registry = profile::parse_dir(dir.path(), &kbd());
    assert_eq!(registry.len(), 2);
    assert_eq!(registry["game-a"].name, "Alpha");
    assert_eq!(registry["game-b"].name, "Beta");
}

#[test]
fn test_rewrite_with_new_timestamp_keeps_size() {
    let dir = TempDir::new().unwrap();
    let before = simple_profile("game-c", "Gamma", "2024-03-01T10:00:00");
    let path = before.write(dir.path());
    let size_before = std::fs::metadata(&path).unwrap().len();

    let after = before.played_at("2024-03-02T11:30:00");
    after.write(dir.path());
    let size_after = std::fs::metadata(&path).unwrap().len();

    assert_eq!(size_before, size_after);
    let prof = profile::parse_header(&path).unwrap();
    assert_eq!(prof.file_size, size_after);
}
