//! Service wiring: spawns the controller on its own thread and hands
//! back a cloneable-free handle for control calls and shutdown.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{LgsError, Result};
use crate::host::HostNotifier;
use crate::native::{AdapterEvent, NativeAdapter};
use crate::sync::controller::{Controller, ControllerMsg};

/// How long [`SyncHandle::shutdown`] waits for the controller thread.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder-ish entry point for the whole engine.
pub struct SyncService;

impl SyncService {
    /// Validates the profiles directory, spawns the controller thread
    /// and performs the initial load before returning.
    ///
    /// A `settings.profiles_dir` of `None` falls back to the
    /// platform's default location; with no default either this is
    /// [`LgsError::NoProfilesDir`].
    pub fn start<N>(mut settings: Settings, notifier: N) -> Result<SyncHandle>
    where
        N: HostNotifier + 'static,
    {
        if settings.profiles_dir.is_none() {
            settings.profiles_dir = crate::config::default_profiles_dir();
        }
        let dir = settings
            .profiles_dir
            .clone()
            .ok_or(LgsError::NoProfilesDir)?;
        if !dir.is_dir() {
            return Err(LgsError::ProfilesDirNotFound { path: dir });
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let controller_tx = tx.clone();
        let thread = thread::Builder::new()
            .name("lgsync-controller".into())
            .spawn(move || {
                let mut controller = Controller::new(settings, notifier, controller_tx);
                controller.bootstrap();
                controller.run(&rx);
            })?;

        info!(dir = %dir.display(), "Sync service started");
        Ok(SyncHandle {
            tx,
            thread: Some(thread),
            adapter: None,
        })
    }
}

/// Control surface over a running controller. Dropping the handle
/// without calling [`SyncHandle::shutdown`] detaches the controller
/// thread.
pub struct SyncHandle {
    tx: Sender<ControllerMsg>,
    thread: Option<JoinHandle<()>>,
    adapter: Option<NativeAdapter>,
}

impl SyncHandle {
    /// Connects a native event adapter and routes its decoded events
    /// into the controller. The link flag is raised once connected and
    /// dropped again when the adapter reports its source closed.
    pub fn attach_native(&mut self, mut adapter: NativeAdapter) -> Result<()> {
        let tx = self.tx.clone();
        adapter.connect(move |event| {
            let msg = match event {
                AdapterEvent::Native(native) => ControllerMsg::Native(native),
                AdapterEvent::LinkDown => ControllerMsg::NativeLink(false),
            };
            let _ = tx.send(msg);
        })?;
        let _ = self.tx.send(ControllerMsg::NativeLink(true));
        self.adapter = Some(adapter);
        Ok(())
    }

    /// Narrows the attached adapter's event stream to the given action
    /// kinds (empty passes everything). Returns false when no adapter
    /// is attached.
    pub fn set_native_filter(&self, actions: Vec<String>) -> bool {
        match &self.adapter {
            Some(adapter) => {
                adapter.set_filter(actions);
                true
            }
            None => false,
        }
    }

    /// Raw sender, for embedders that need messages not covered by the
    /// convenience methods.
    pub fn sender(&self) -> Sender<ControllerMsg> {
        self.tx.clone()
    }

    pub fn select_profile(&self, name: impl Into<String>) -> bool {
        self.send(ControllerMsg::SelectProfile(name.into()))
    }

    pub fn set_shift_state(&self, device: impl Into<String>, slot: u8) -> bool {
        self.send(ControllerMsg::SetShiftState {
            device: device.into(),
            slot,
        })
    }

    pub fn set_device_filter(&self, devices: Vec<String>) -> bool {
        self.send(ControllerMsg::SetDeviceFilter(devices))
    }

    pub fn set_profiles_dir(&self, dir: impl Into<std::path::PathBuf>) -> bool {
        self.send(ControllerMsg::SetProfilesDir(dir.into()))
    }

    pub fn set_auto_switch(&self, enabled: bool) -> bool {
        self.send(ControllerMsg::SetAutoSwitch(enabled))
    }

    pub fn set_poll_interval_ms(&self, ms: u64) -> bool {
        self.send(ControllerMsg::SetPollIntervalMs(ms))
    }

    pub fn set_unmapped_text(&self, text: impl Into<String>) -> bool {
        self.send(ControllerMsg::SetUnmappedText(text.into()))
    }

    /// Re-parse one profile by guid, or the whole directory.
    pub fn reload(&self, guid: Option<String>) -> bool {
        self.send(ControllerMsg::Reload(guid))
    }

    /// Stops the adapter and the controller. Returns false if the
    /// controller thread did not exit within the timeout.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        if let Some(mut adapter) = self.adapter.take() {
            if let Err(e) = adapter.disconnect() {
                warn!(error = %e, "Native adapter did not disconnect cleanly");
            }
        }
        let _ = self.tx.send(ControllerMsg::Shutdown);
        let Some(thread) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!("Controller thread did not stop in time");
                self.thread = Some(thread);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        thread.join().is_ok()
    }

    fn send(&self, msg: ControllerMsg) -> bool {
        self.tx.send(msg).is_ok()
    }
}
