//! Synchronization controller.
//!
//! Single logical owner of the profile registry and the
//! current/last-played cursors. Batches from the directory watcher and
//! events from the native adapter funnel through one message queue and
//! are applied one at a time, in delivery order, so consumers never see
//! a torn update. Within a batch removals are applied before
//! additions/modifications, so a delete-then-recreate can't be
//! reordered into "still present".

use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::host::HostNotifier;
use crate::native::NativeEvent;
use crate::profile::{
    self, base_device_type, device_layout, epoch, slot_key, Profile, DEFAULT_PROFILE_NAME,
};
use crate::watcher::{WatchBatch, WatchEvent, Watcher, WatcherHandle};

/// Bound on waiting for the watcher thread during stop/restart.
pub const WATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive unprompted watcher restarts before giving up until the
/// watcher is explicitly reconfigured.
pub const WATCHER_RESTART_LIMIT: u32 = 5;

/// Pause before each unprompted restart, so a directory that exists
/// but cannot be read (permissions, fd exhaustion) cannot drive a
/// tight respawn loop.
const WATCHER_RESTART_BACKOFF: Duration = Duration::from_millis(200);

/// Everything the controller reacts to. All mutation of the registry
/// happens inside the controller in response to one of these.
#[derive(Debug)]
pub enum ControllerMsg {
    /// A change batch from the directory watcher.
    Files(WatchBatch),
    /// The watcher's observation loop died.
    WatcherStopped,
    /// A decoded event from the native adapter.
    Native(NativeEvent),
    /// Native adapter link went up or down. While up, profile
    /// activations are authoritative and the size/timestamp heuristic
    /// is suspended.
    NativeLink(bool),
    SetDeviceFilter(Vec<String>),
    SetProfilesDir(PathBuf),
    SetAutoSwitch(bool),
    SetPollIntervalMs(u64),
    SetUnmappedText(String),
    /// Switch to a profile by name (first match wins).
    SelectProfile(String),
    SetShiftState { device: String, slot: u8 },
    /// Re-parse one profile by guid, or everything.
    Reload(Option<String>),
    Shutdown,
}

/// The profile registry and reconciliation state machine.
pub struct Controller<N: HostNotifier> {
    settings: Settings,
    registry: HashMap<String, Profile>,
    current: Option<String>,
    last_played: Option<String>,
    shift_states: HashMap<String, u8>,
    native_linked: bool,
    notifier: N,
    inbox_tx: Sender<ControllerMsg>,
    watcher: Option<WatcherHandle>,
    watcher_restarts: u32,
}

impl<N: HostNotifier> Controller<N> {
    pub fn new(settings: Settings, notifier: N, inbox_tx: Sender<ControllerMsg>) -> Self {
        Self {
            settings,
            registry: HashMap::new(),
            current: None,
            last_played: None,
            shift_states: HashMap::new(),
            native_linked: false,
            notifier,
            inbox_tx,
            watcher: None,
            watcher_restarts: 0,
        }
    }

    /// Initial load + watcher start. Called once on the controller
    /// thread before the message loop.
    pub fn bootstrap(&mut self) {
        self.full_reload();
        for device in self.settings.device_filter.clone() {
            let base = base_device_type(&device).to_string();
            let slot = self.current_shift_state(&base);
            self.notifier.shift_state(&base, slot);
        }
        self.start_watcher();
    }

    /// Message loop. Returns when the inbox closes or on
    /// [`ControllerMsg::Shutdown`]; every message already taken is
    /// applied to completion first.
    pub fn run(mut self, rx: &Receiver<ControllerMsg>) {
        info!("Controller started");
        while let Ok(msg) = rx.recv() {
            if !self.handle(msg) {
                break;
            }
        }
        self.stop_watcher();
        info!("Controller stopped");
    }

    /// Dispatches one message. Returns false on shutdown.
    pub fn handle(&mut self, msg: ControllerMsg) -> bool {
        match msg {
            ControllerMsg::Files(batch) => {
                // A delivered batch means the watcher is healthy again.
                self.watcher_restarts = 0;
                self.apply_batch(batch);
            }
            ControllerMsg::WatcherStopped => self.on_watcher_stopped(),
            ControllerMsg::Native(event) => self.apply_native(event),
            ControllerMsg::NativeLink(up) => {
                info!(up, "Native event link changed");
                self.native_linked = up;
            }
            ControllerMsg::SetDeviceFilter(devices) => {
                if self.settings.set_device_filter(devices) {
                    self.full_reload();
                }
            }
            ControllerMsg::SetProfilesDir(dir) => {
                if self.settings.set_profiles_dir(dir) {
                    self.watcher_restarts = 0;
                    self.full_reload();
                    self.start_watcher();
                }
            }
            ControllerMsg::SetAutoSwitch(enabled) => {
                if self.settings.set_auto_switch(enabled) && enabled {
                    if let Some(guid) = self.last_played.clone() {
                        self.set_current(&guid);
                    }
                }
            }
            ControllerMsg::SetPollIntervalMs(ms) => {
                if self.settings.set_poll_interval_ms(ms) {
                    self.watcher_restarts = 0;
                    self.start_watcher();
                }
            }
            ControllerMsg::SetUnmappedText(text) => {
                if self.settings.set_unmapped_text(text) {
                    if let Some(current) = self.current.clone() {
                        self.emit_key_states(&current);
                    }
                }
            }
            ControllerMsg::SelectProfile(name) => match self.find_guid_by_name(&name) {
                Some(guid) => self.set_current(&guid),
                None => warn!(name, "No profile with that name"),
            },
            ControllerMsg::SetShiftState { device, slot } => self.set_shift_state(&device, slot),
            ControllerMsg::Reload(Some(guid)) => self.reload_one(&guid),
            ControllerMsg::Reload(None) => self.full_reload(),
            ControllerMsg::Shutdown => return false,
        }
        true
    }

    // === batch reconciliation ===

    /// Applies one watcher batch: removals first, then per-path
    /// selection-vs-edit classification, then switch-target election.
    pub fn apply_batch(&mut self, batch: WatchBatch) {
        let mut list_changed = false;

        for path in &batch.removed {
            list_changed |= self.remove_profile_at(path);
        }

        // "Previously recorded" baseline: candidates must beat the
        // last-played timestamp as it stood before this batch.
        let baseline = self.last_played_timestamp();
        let mut target: Option<(String, NaiveDateTime)> = None;

        for path in batch.added.iter().chain(batch.modified.iter()) {
            let Some(guid) = profile_id_from_path(path) else {
                warn!(path = %path.display(), "Cannot derive profile id from file name");
                continue;
            };
            let header = match profile::parse_header(path) {
                Ok(header) => header,
                Err(e) => {
                    // Ambiguous signal: conservatively no change.
                    warn!(path = %path.display(), error = %e, "Header parse failed, keeping prior state");
                    continue;
                }
            };
            let last_used = header.last_used;

            let is_selection = !self.native_linked
                && self.registry.get(&guid).is_some_and(|saved| {
                    header.last_used > saved.last_used && header.file_size == saved.file_size
                });

            if is_selection {
                debug!(guid, last_used = %last_used, "Selection event (size unchanged)");
                if let Some(saved) = self.registry.get_mut(&guid) {
                    saved.last_used = last_used;
                }
            } else {
                let prof = match profile::parse_full(path, &self.settings.device_filter) {
                    Ok(prof) => prof,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Re-parse failed, keeping prior state");
                        continue;
                    }
                };
                info!(guid = %prof.guid, name = %prof.name, size = prof.file_size, "Profile (re)loaded");
                let name = prof.name.clone();
                self.registry.insert(guid.clone(), prof);
                list_changed = true;
                if self.current.as_deref() == Some(guid.as_str()) {
                    self.notifier.current_profile(&name);
                    self.emit_key_states(&guid);
                }
            }

            // Selection candidates and freshly loaded profiles compete
            // for the switch target; strictly-greater keeps the
            // earliest-processed one on equal timestamps.
            if last_used > baseline && target.as_ref().is_none_or(|(_, best)| last_used > *best) {
                target = Some((guid, last_used));
            }
        }

        if list_changed {
            self.notify_profile_list();
        }

        if let Some((guid, ts)) = target {
            if self.last_played.as_deref() != Some(guid.as_str()) {
                debug!(guid, last_used = %ts, "Switch target elected");
                self.last_played = Some(guid.clone());
                if self.settings.auto_switch {
                    self.set_current(&guid);
                }
            }
        }
    }

    fn remove_profile_at(&mut self, path: &Path) -> bool {
        let Some(guid) = profile_id_from_path(path) else {
            return false;
        };
        let Some(prev) = self.registry.remove(&guid) else {
            return false;
        };
        info!(guid, name = %prev.name, "Profile removed");
        if self.last_played.as_deref() == Some(guid.as_str()) {
            self.last_played = None;
        }
        if self.current.as_deref() == Some(guid.as_str()) {
            self.current = None;
            if let Some(fallback) = self.find_guid_by_name(DEFAULT_PROFILE_NAME) {
                self.set_current(&fallback);
            }
        }
        true
    }

    // === native events ===

    pub fn apply_native(&mut self, event: NativeEvent) {
        match event {
            NativeEvent::ProfileActivated { device, profile } => {
                debug!(device, profile, "Native profile activation");
                let Some(guid) = self.find_guid_by_name(&profile) else {
                    warn!(profile, "Activated profile is not in the registry");
                    return;
                };
                if self.last_played.as_deref() != Some(guid.as_str()) {
                    self.last_played = Some(guid.clone());
                    if self.settings.auto_switch {
                        self.set_current(&guid);
                    }
                }
            }
            NativeEvent::ShiftState { device, slot } => self.set_shift_state(&device, slot),
            NativeEvent::Button {
                device,
                key,
                pressed,
            } => self.notifier.button(&device, &key, pressed),
        }
    }

    // === cursor and registry operations ===

    fn set_current(&mut self, guid: &str) {
        if self.current.as_deref() == Some(guid) {
            return;
        }
        let Some(name) = self.registry.get(guid).map(|p| p.name.clone()) else {
            warn!(guid, "Cannot switch to unknown profile");
            return;
        };
        info!(guid, name, "Current profile changed");
        self.current = Some(guid.to_string());
        self.notifier.current_profile(&name);
        self.emit_key_states(guid);
    }

    /// Changes a device's active memory slot. Never reclassifies any
    /// profile; only re-exposes the per-slot values.
    pub fn set_shift_state(&mut self, device: &str, slot: u8) {
        let base = base_device_type(device).to_string();
        if let Some(layout) = device_layout(&base) {
            if slot == 0 || slot > layout.slots {
                warn!(device = base, slot, max = layout.slots, "Memory slot out of range");
                return;
            }
        }
        if self.current_shift_state(&base) == slot {
            return;
        }
        debug!(device = base, slot, "Shift state changed");
        self.shift_states.insert(base.clone(), slot);
        self.notifier.shift_state(&base, slot);
        if let Some(current) = self.current.clone() {
            self.emit_key_states(&current);
        }
    }

    /// Discards the registry and rebuilds it from disk. The only
    /// operation that does not patch incrementally.
    pub fn full_reload(&mut self) {
        let Some(dir) = self.settings.profiles_dir.clone() else {
            warn!("No profiles directory configured");
            self.registry.clear();
            self.notify_profile_list();
            return;
        };
        info!(dir = %dir.display(), devices = ?self.settings.device_filter, "Full profile reload");
        self.registry = profile::parse_dir(&dir, &self.settings.device_filter);
        self.notify_profile_list();

        if self
            .current
            .as_ref()
            .is_some_and(|g| !self.registry.contains_key(g))
        {
            self.current = None;
        }
        if self
            .last_played
            .as_ref()
            .is_some_and(|g| !self.registry.contains_key(g))
        {
            self.last_played = None;
        }

        if let Some(guid) = self.initial_profile() {
            self.last_played = Some(guid.clone());
            if self.settings.auto_switch {
                self.set_current(&guid);
            }
        }
    }

    fn reload_one(&mut self, guid: &str) {
        let Some(dir) = self.settings.profiles_dir.clone() else {
            warn!("No profiles directory configured");
            return;
        };
        let path = dir.join(format!("{guid}.xml"));
        match profile::parse_full(&path, &self.settings.device_filter) {
            Ok(prof) => {
                info!(guid = %prof.guid, name = %prof.name, "Profile reloaded");
                let name = prof.name.clone();
                self.registry.insert(guid.to_string(), prof);
                self.notify_profile_list();
                if self.current.as_deref() == Some(guid) {
                    self.notifier.current_profile(&name);
                    self.emit_key_states(guid);
                }
            }
            Err(e) => warn!(guid, error = %e, "Reload failed, keeping prior state"),
        }
    }

    /// Most recently used profile, else "Default Profile", else the
    /// lowest guid; ties on last-used break toward the lower guid so a
    /// reload is deterministic.
    fn initial_profile(&self) -> Option<String> {
        let newest = self
            .registry
            .values()
            .filter(|p| p.last_used > epoch())
            .max_by_key(|p| (p.last_used, Reverse(p.guid.clone())))
            .map(|p| p.guid.clone());
        newest
            .or_else(|| self.find_guid_by_name(DEFAULT_PROFILE_NAME))
            .or_else(|| self.registry.keys().min().cloned())
    }

    fn find_guid_by_name(&self, name: &str) -> Option<String> {
        // Names are not unique; first match wins, lowest guid for
        // determinism.
        self.registry
            .values()
            .filter(|p| p.name == name)
            .map(|p| p.guid.clone())
            .min()
    }

    fn last_played_timestamp(&self) -> NaiveDateTime {
        self.last_played
            .as_ref()
            .and_then(|g| self.registry.get(g))
            .map_or_else(epoch, |p| p.last_used)
    }

    // === outward notifications ===

    fn notify_profile_list(&self) {
        let mut names: Vec<String> = self.registry.values().map(|p| p.name.clone()).collect();
        names.sort();
        self.notifier.profile_list(&names);
    }

    fn emit_key_states(&self, guid: &str) {
        let Some(prof) = self.registry.get(guid) else {
            return;
        };
        for device in &self.settings.device_filter {
            let base = base_device_type(device);
            let Some(layout) = device_layout(base) else {
                warn!(device, "No layout known for device type");
                continue;
            };
            for key in 1..=layout.keys {
                let key_id = format!("{}{key}", layout.key_prefix);
                for slot in 1..=layout.slots {
                    let value = prof
                        .macro_for_key(base, &slot_key(&key_id, slot))
                        .map_or(self.settings.unmapped_text.as_str(), |m| m.name.as_str());
                    self.notifier.key_state(base, &key_id, slot, value);
                }
            }
        }
    }

    // === watcher lifecycle ===

    fn start_watcher(&mut self) {
        self.stop_watcher();
        if !self.settings.watching_enabled() {
            debug!("Watching disabled");
            return;
        }
        let Some(dir) = self.settings.profiles_dir.clone() else {
            return;
        };
        let tx = self.inbox_tx.clone();
        let spawned = Watcher::new(dir, self.settings.poll_interval)
            .native_events(self.settings.native_fs_events)
            .spawn(move |event| {
                let msg = match event {
                    WatchEvent::Batch(batch) => ControllerMsg::Files(batch),
                    WatchEvent::Stopped => ControllerMsg::WatcherStopped,
                };
                let _ = tx.send(msg);
            });
        match spawned {
            Ok(handle) => self.watcher = Some(handle),
            Err(e) => warn!(error = %e, "Cannot start the profile watcher"),
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(mut handle) = self.watcher.take() {
            let _ = handle.stop(WATCHER_STOP_TIMEOUT);
        }
    }

    fn on_watcher_stopped(&mut self) {
        self.stop_watcher();
        if !self.settings.watching_enabled() {
            debug!("Watcher stopped with watching disabled");
            return;
        }
        let dir_exists = self
            .settings
            .profiles_dir
            .as_deref()
            .is_some_and(Path::is_dir);
        if !dir_exists {
            warn!("Watcher stopped and the profiles directory is gone; waiting for reconfiguration");
            return;
        }
        if self.watcher_restarts >= WATCHER_RESTART_LIMIT {
            warn!(
                attempts = self.watcher_restarts,
                "Watcher keeps failing; staying down until reconfigured"
            );
            return;
        }
        self.watcher_restarts += 1;
        warn!(attempt = self.watcher_restarts, "Watcher stopped unexpectedly, restarting");
        thread::sleep(WATCHER_RESTART_BACKOFF);
        self.start_watcher();
    }

    // === accessors (mainly for tests and embedders) ===

    pub fn registry(&self) -> &HashMap<String, Profile> {
        &self.registry
    }

    pub fn current_guid(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn last_played_guid(&self) -> Option<&str> {
        self.last_played.as_deref()
    }

    pub fn watcher_restart_attempts(&self) -> u32 {
        self.watcher_restarts
    }

    pub fn current_shift_state(&self, device: &str) -> u8 {
        self.shift_states
            .get(base_device_type(device))
            .copied()
            .unwrap_or(1)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

/// Profile id derived deterministically from the file name: the stem
/// before the first `.` (profiles are stored as `<guid>.xml`).
pub fn profile_id_from_path(path: &Path) -> Option<String> {
    path.file_name()?
        .to_str()?
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
