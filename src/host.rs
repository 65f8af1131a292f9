//! Outward notification interface to the host collaborator.
//!
//! The controller reports state deltas through [`HostNotifier`]; every
//! call is fire-and-forget and nothing flows back into the engine. The
//! binary ships a JSON-lines implementation for machine consumers and a
//! quieter text implementation for interactive use; tests use
//! [`recording::RecordingNotifier`].

use serde::Serialize;
use tracing::{debug, info};

/// Sink for engine state updates. Implementations must be cheap and must
/// never block the controller for long; they are called from the
/// controller's own thread.
pub trait HostNotifier: Send {
    /// Full, sorted list of known profile names.
    fn profile_list(&self, names: &[String]);

    /// The current profile changed.
    fn current_profile(&self, name: &str);

    /// A button's effective value for one memory slot: the bound macro
    /// name, or the configured unmapped-button text.
    fn key_state(&self, device: &str, key: &str, slot: u8, value: &str);

    /// A device's active memory slot changed.
    fn shift_state(&self, device: &str, slot: u8);

    /// Raw button press/release forwarded from the native event source.
    fn button(&self, device: &str, key: &str, pressed: bool);
}

/// JSON-lines notifier for machine consumers, one event object per line
/// on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonNotifier;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum HostEvent<'a> {
    ProfileList { names: &'a [String] },
    CurrentProfile { name: &'a str },
    KeyState { device: &'a str, key: &'a str, slot: u8, value: &'a str },
    ShiftState { device: &'a str, slot: u8 },
    Button { device: &'a str, key: &'a str, pressed: bool },
}

impl JsonNotifier {
    fn emit(event: &HostEvent<'_>) {
        // Writing a line can only fail on a closed stdout; nothing useful
        // to do about it here.
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }
}

impl HostNotifier for JsonNotifier {
    fn profile_list(&self, names: &[String]) {
        Self::emit(&HostEvent::ProfileList { names });
    }

    fn current_profile(&self, name: &str) {
        Self::emit(&HostEvent::CurrentProfile { name });
    }

    fn key_state(&self, device: &str, key: &str, slot: u8, value: &str) {
        Self::emit(&HostEvent::KeyState { device, key, slot, value });
    }

    fn shift_state(&self, device: &str, slot: u8) {
        Self::emit(&HostEvent::ShiftState { device, slot });
    }

    fn button(&self, device: &str, key: &str, pressed: bool) {
        Self::emit(&HostEvent::Button { device, key, pressed });
    }
}

/// Interactive notifier: headline changes on stdout, the chatty per-key
/// stream at debug level only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextNotifier;

impl HostNotifier for TextNotifier {
    fn profile_list(&self, names: &[String]) {
        info!(count = names.len(), "Profile list updated");
    }

    fn current_profile(&self, name: &str) {
        println!("Current profile: {name}");
    }

    fn key_state(&self, device: &str, key: &str, slot: u8, value: &str) {
        debug!(device, key, slot, value, "Key state");
    }

    fn shift_state(&self, device: &str, slot: u8) {
        println!("{device} memory slot: M{slot}");
    }

    fn button(&self, device: &str, key: &str, pressed: bool) {
        println!("{device} {key} {}", if pressed { "pressed" } else { "released" });
    }
}

/// Recording notifier for testing the engine without a host process.
pub mod recording {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::HostNotifier;

    /// Recorded notification for assertions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Notification {
        ProfileList(Vec<String>),
        CurrentProfile(String),
        KeyState {
            device: String,
            key: String,
            slot: u8,
            value: String,
        },
        ShiftState {
            device: String,
            slot: u8,
        },
        Button {
            device: String,
            key: String,
            pressed: bool,
        },
    }

    /// Notifier that records every call. Clones share the same log, so a
    /// test can keep one half and hand the other to the engine.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        log: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of everything recorded so far.
        pub fn calls(&self) -> Vec<Notification> {
            self.log.lock().expect("notifier log poisoned").clone()
        }

        /// Discards the log.
        pub fn clear(&self) {
            self.log.lock().expect("notifier log poisoned").clear();
        }

        /// Last recorded current-profile change, if any.
        pub fn last_current_profile(&self) -> Option<String> {
            self.calls().into_iter().rev().find_map(|n| match n {
                Notification::CurrentProfile(name) => Some(name),
                _ => None,
            })
        }

        /// Polls until `pred` matches a recorded notification or the
        /// timeout expires. Returns whether a match was seen.
        pub fn wait_for(
            &self,
            timeout: Duration,
            pred: impl Fn(&Notification) -> bool,
        ) -> bool {
            let deadline = Instant::now() + timeout;
            loop {
                if self.calls().iter().any(&pred) {
                    return true;
                }
                if Instant::now() >= deadline {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        fn push(&self, notification: Notification) {
            self.log
                .lock()
                .expect("notifier log poisoned")
                .push(notification);
        }
    }

    impl HostNotifier for RecordingNotifier {
        fn profile_list(&self, names: &[String]) {
            self.push(Notification::ProfileList(names.to_vec()));
        }

        fn current_profile(&self, name: &str) {
            self.push(Notification::CurrentProfile(name.to_string()));
        }

        fn key_state(&self, device: &str, key: &str, slot: u8, value: &str) {
            self.push(Notification::KeyState {
                device: device.to_string(),
                key: key.to_string(),
                slot,
                value: value.to_string(),
            });
        }

        fn shift_state(&self, device: &str, slot: u8) {
            self.push(Notification::ShiftState {
                device: device.to_string(),
                slot,
            });
        }

        fn button(&self, device: &str, key: &str, pressed: bool) {
            self.push(Notification::Button {
                device: device.to_string(),
                key: key.to_string(),
                pressed,
            });
        }
    }
}
