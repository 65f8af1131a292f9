//! Data model for LGS game profiles.
//!
//! A profile is a named collection of macros plus per-device button
//! assignments, organized by memory (shift) slot. Profiles are parsed
//! from the XML files the Gaming Software writes; this module holds only
//! the parsed shape and lookup helpers.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::Serialize;

/// Device scope used for state names that apply to every device.
pub const ANY_DEVICE: &str = "any";

/// Name of the profile the engine falls back to when the current one is removed.
pub const DEFAULT_PROFILE_NAME: &str = "Default Profile";

/// The epoch placeholder used when a profile carries no usable
/// `lastplayeddate`. Treated as "never used".
pub fn epoch() -> NaiveDateTime {
    chrono::DateTime::UNIX_EPOCH.naive_utc()
}

/// A named programmable action invocable from a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Macro {
    pub guid: String,
    pub name: String,
    /// Action category, taken from the macro's first content element
    /// (e.g. "keystroke", "multikey", "textblock").
    pub kind: String,
}

/// A binding of a macro to a device button and memory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// Guid of the macro this key triggers. Guaranteed to resolve within
    /// the owning profile; unresolved references are dropped at parse time.
    pub macro_guid: String,
    /// Device-specific button identifier (e.g. "G5", "Button9").
    pub key_id: String,
    /// Memory slot index, 1-based.
    pub shift_state: u8,
}

impl Assignment {
    /// Composite key used to index assignments: `"<key_id>M<shift_state>"`.
    pub fn slot_key(&self) -> String {
        slot_key(&self.key_id, self.shift_state)
    }
}

/// Builds the composite assignment key for a button + memory slot.
pub fn slot_key(key_id: &str, shift_state: u8) -> String {
    format!("{key_id}M{shift_state}")
}

/// A parsed game profile.
///
/// `guid` doubles as the file identity (profiles are stored as
/// `<guid>.xml`). `name` is not guaranteed unique; lookups by name are
/// first-match-wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub guid: String,
    pub name: String,
    /// Raw description text; state-name annotations are scraped from it.
    pub description: String,
    /// Last time the Gaming Software activated this profile. Untrusted
    /// input; monotonic in practice but never relied upon to be.
    pub last_used: NaiveDateTime,
    /// Size of the definition file at the time it was (re)loaded. Used
    /// only as a cheap change-classification signal.
    pub file_size: u64,
    /// Associated application paths, informational.
    pub targets: Vec<String>,
    /// Macros by guid. Hidden and backup macros are never present.
    pub macros: HashMap<String, Macro>,
    /// Assignments by device base type, then by composite slot key.
    /// Only devices that matched the caller's filter appear here.
    pub assignments: HashMap<String, HashMap<String, Assignment>>,
    /// Memory-slot display names by device type (or [`ANY_DEVICE`]), then slot.
    pub state_names: HashMap<String, HashMap<u8, String>>,
}

impl Profile {
    pub fn new(guid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            description: String::new(),
            last_used: epoch(),
            file_size: 0,
            targets: Vec::new(),
            macros: HashMap::new(),
            assignments: HashMap::new(),
            state_names: HashMap::new(),
        }
    }

    /// Resolves the macro bound to a device button, if any.
    ///
    /// `key_name` is the composite slot key, e.g. `"G5M2"`.
    pub fn macro_for_key(&self, device: &str, key_name: &str) -> Option<&Macro> {
        let assign = self.assignments.get(device)?.get(key_name)?;
        self.macros.get(&assign.macro_guid)
    }

    /// Display names for memory slots `1..=max_slots` on `device`.
    ///
    /// Description annotations scope labels by the device's short alias
    /// (e.g. `kbd.M1:Combat`), so the lookup tries the alias first,
    /// then the lowercased base type, then the base type verbatim.
    /// Device-specific names win, then the "any device" fallback, then a
    /// generic `"M<slot>"` label.
    pub fn state_names_for(&self, device: &str, max_slots: u8) -> BTreeMap<u8, String> {
        let base = base_device_type(device);
        let specific = device_layout(base)
            .and_then(|l| self.state_names.get(l.alias))
            .or_else(|| self.state_names.get(&base.to_lowercase()))
            .or_else(|| self.state_names.get(base));
        let any = self.state_names.get(ANY_DEVICE);
        let mut names = BTreeMap::new();
        for slot in 1..=max_slots {
            let name = specific
                .and_then(|m| m.get(&slot))
                .or_else(|| any.and_then(|m| m.get(&slot)))
                .cloned()
                .unwrap_or_else(|| format!("M{slot}"));
            names.insert(slot, name);
        }
        names
    }
}

/// Physical layout of a supported device type.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeviceLayout {
    /// Base device type as it appears in profile `devicecategory` paths.
    pub device: &'static str,
    /// Number of programmable buttons.
    pub keys: u8,
    /// Number of memory (shift) slots.
    pub slots: u8,
    /// Prefix used to form button identifiers (e.g. "G" -> "G1".."G18").
    pub key_prefix: &'static str,
    /// Short alias used in outward notifications.
    pub alias: &'static str,
}

/// Layouts of the device types LGS profiles can carry assignments for.
pub const DEVICE_LAYOUTS: &[DeviceLayout] = &[
    DeviceLayout {
        device: "Keyboard",
        keys: 18,
        slots: 3,
        key_prefix: "G",
        alias: "kbd",
    },
    DeviceLayout {
        device: "LeftHandedController",
        keys: 29,
        slots: 3,
        key_prefix: "G",
        alias: "lhc",
    },
    DeviceLayout {
        device: "Mouse",
        keys: 20,
        slots: 1,
        key_prefix: "Button",
        alias: "mouse",
    },
    DeviceLayout {
        device: "Headset",
        keys: 3,
        slots: 1,
        key_prefix: "G",
        alias: "hs",
    },
];

/// Looks up the layout for a device type (base component only).
pub fn device_layout(device: &str) -> Option<&'static DeviceLayout> {
    let base = base_device_type(device);
    DEVICE_LAYOUTS.iter().find(|l| l.device == base)
}

/// Base device-type component of a possibly dotted device string
/// (`"Mouse.G700s"` -> `"Mouse"`).
pub fn base_device_type(device: &str) -> &str {
    device.split('.').next().unwrap_or(device)
}
