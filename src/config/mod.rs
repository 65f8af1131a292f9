//! Engine configuration.
//!
//! The host protocol delivers settings as loose key/value updates; this
//! module keeps them as a typed structure with explicit, validated update
//! methods so the controller never sees a half-applied value.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

/// Placeholder text reported for buttons with no macro bound.
pub const DEFAULT_UNMAPPED_TEXT: &str = "...";

/// Default observation interval for the directory watcher.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Typed engine settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory the profile definition files live in (non-recursive).
    pub profiles_dir: Option<PathBuf>,
    /// Device types whose assignments are extracted; entries may carry a
    /// model suffix ("Mouse.G700s").
    pub device_filter: Vec<String>,
    /// Promote the most recently selected profile to current automatically.
    pub auto_switch: bool,
    /// Watcher observation interval; zero disables watching.
    pub poll_interval: Duration,
    /// Text reported for unassigned buttons.
    pub unmapped_text: String,
    /// Use native filesystem change notification where available; when
    /// off the watcher polls on the interval only.
    pub native_fs_events: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            device_filter: vec!["Keyboard".to_string()],
            auto_switch: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            unmapped_text: DEFAULT_UNMAPPED_TEXT.to_string(),
            native_fs_events: true,
        }
    }
}

impl Settings {
    /// Replaces the device filter. Entries are trimmed and empties
    /// dropped. Returns true if the effective filter changed.
    pub fn set_device_filter(&mut self, devices: Vec<String>) -> bool {
        let cleaned: Vec<String> = devices
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        if cleaned == self.device_filter {
            return false;
        }
        debug!(devices = ?cleaned, "Device filter changed");
        self.device_filter = cleaned;
        true
    }

    /// Replaces the profiles directory. Returns true if it changed.
    pub fn set_profiles_dir(&mut self, dir: PathBuf) -> bool {
        if self.profiles_dir.as_deref() == Some(dir.as_path()) {
            return false;
        }
        debug!(dir = %dir.display(), "Profiles directory changed");
        self.profiles_dir = Some(dir);
        true
    }

    /// Sets the poll interval from milliseconds. Zero disables watching.
    /// Returns true if the interval changed.
    pub fn set_poll_interval_ms(&mut self, ms: u64) -> bool {
        let interval = Duration::from_millis(ms);
        if interval == self.poll_interval {
            return false;
        }
        debug!(ms, "Poll interval changed");
        self.poll_interval = interval;
        true
    }

    /// Enables or disables auto-switching. Returns true if it changed.
    pub fn set_auto_switch(&mut self, enabled: bool) -> bool {
        if enabled == self.auto_switch {
            return false;
        }
        self.auto_switch = enabled;
        true
    }

    /// Sets the unmapped-button placeholder. Empty values fall back to
    /// the default. Returns true if the text changed.
    pub fn set_unmapped_text(&mut self, text: String) -> bool {
        let text = if text.is_empty() {
            DEFAULT_UNMAPPED_TEXT.to_string()
        } else {
            text
        };
        if text == self.unmapped_text {
            return false;
        }
        self.unmapped_text = text;
        true
    }

    /// True when the watcher should be running at all.
    pub fn watching_enabled(&self) -> bool {
        !self.poll_interval.is_zero() && self.profiles_dir.is_some()
    }
}

/// Platform default for the LGS profiles directory.
///
/// Windows: `%LOCALAPPDATA%\Logitech\Logitech Gaming Software\profiles`.
/// macOS: `~/Library/Application Support/Logitech/profiles`.
/// Elsewhere there is no default; the directory must be configured.
pub fn default_profiles_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir().map(|d| {
            d.join("Logitech")
                .join("Logitech Gaming Software")
                .join("profiles")
        })
    }
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|d| {
            d.join("Library")
                .join("Application Support")
                .join("Logitech")
                .join("profiles")
        })
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        None
    }
}
