//! Directory watcher for profile definition files.
//!
//! Maintains a `path -> mtime` snapshot of filter-matching files in one
//! directory (non-recursive) and diffs it on every observation tick.
//! Ticks come from native filesystem notification where available, with
//! a plain interval poll as backstop and fallback. Consumers receive
//! batched added/modified/removed path sets; empty diffs are never
//! emitted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use notify::{RecursiveMode, Watcher as _};
use tracing::{debug, error, info, warn};

use crate::error::{LgsError, Result};

/// Default minimum mtime delta for a file to count as modified.
/// Smaller deltas are filesystem metadata churn, not writes.
pub const DEFAULT_GUARD_THRESHOLD: Duration = Duration::from_millis(50);

/// Default delay between computing a batch and delivering it, giving an
/// external writer a moment to finish flushing. Best effort only.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(5);

/// One non-empty batch of observed changes. Paths are sorted so batches
/// are processed in a deterministic order downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchBatch {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl WatchBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Events delivered to the watch consumer.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A non-empty change batch.
    Batch(WatchBatch),
    /// The observation loop hit an unrecoverable error and exited.
    /// The owner decides whether to restart; the watcher never does.
    Stopped,
}

/// Configuration for one directory observation loop.
#[derive(Debug, Clone)]
pub struct Watcher {
    dir: PathBuf,
    interval: Duration,
    extension: String,
    guard: Duration,
    settle: Duration,
    native: bool,
}

impl Watcher {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            extension: ".xml".to_string(),
            guard: DEFAULT_GUARD_THRESHOLD,
            settle: DEFAULT_SETTLE_DELAY,
            native: true,
        }
    }

    /// File-name suffix to watch (default ".xml").
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    /// Minimum mtime delta treated as a real modification.
    pub fn guard_threshold(mut self, guard: Duration) -> Self {
        self.guard = guard;
        self
    }

    /// Delay between computing and delivering a batch.
    pub fn settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Toggles native change notification; off means pure polling.
    pub fn native_events(mut self, enabled: bool) -> Self {
        self.native = enabled;
        self
    }

    /// Starts the observation loop on a background thread. `emit` is
    /// called once per non-empty batch and once with
    /// [`WatchEvent::Stopped`] if the loop dies.
    pub fn spawn<F>(self, emit: F) -> Result<WatcherHandle>
    where
        F: Fn(WatchEvent) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("lgsync-watcher".to_string())
            .spawn(move || self.run(&stop_rx, &emit))
            .map_err(|e| LgsError::Watch(format!("failed to spawn watcher thread: {e}")))?;
        Ok(WatcherHandle {
            stop_tx,
            thread: Some(thread),
        })
    }

    fn run<F>(self, stop_rx: &Receiver<()>, emit: &F)
    where
        F: Fn(WatchEvent),
    {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let mut native_watcher = if self.native {
            match Self::native_watcher(&self.dir, wake_tx) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(error = %e, "Native change notification unavailable, polling instead");
                    None
                }
            }
        } else {
            None
        };

        info!(
            dir = %self.dir.display(),
            interval_ms = self.interval.as_millis() as u64,
            native = native_watcher.is_some(),
            "Watching profiles directory"
        );

        let mut before = match self.snapshot() {
            Ok(snap) => snap,
            Err(e) => {
                error!(dir = %self.dir.display(), error = %e, "Initial directory scan failed");
                emit(WatchEvent::Stopped);
                return;
            }
        };

        loop {
            let tick = if native_watcher.is_some() {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(wake_rx) -> res => {
                        if res.is_err() {
                            // Notification backend went away mid-run.
                            warn!("Native notification channel closed, polling instead");
                            native_watcher = None;
                        }
                        true
                    }
                    default(self.interval) => false,
                }
            } else {
                select! {
                    recv(stop_rx) -> _ => break,
                    default(self.interval) => true,
                }
            };
            if !tick {
                continue;
            }

            let after = match self.snapshot() {
                Ok(snap) => snap,
                Err(e) => {
                    error!(dir = %self.dir.display(), error = %e, "Watcher loop failed, stopping");
                    emit(WatchEvent::Stopped);
                    return;
                }
            };

            let batch = diff_snapshots(&before, &after, self.guard);
            if !batch.is_empty() {
                debug!(
                    added = batch.added.len(),
                    modified = batch.modified.len(),
                    removed = batch.removed.len(),
                    "Observed profile changes"
                );
                // Give the external writer a moment to finish flushing.
                thread::sleep(self.settle);
                emit(WatchEvent::Batch(batch));
            }
            before = after;
        }

        drop(native_watcher);
        debug!("Watcher stopped on request");
    }

    fn native_watcher(
        dir: &Path,
        wake_tx: Sender<()>,
    ) -> notify::Result<notify::RecommendedWatcher> {
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if res.is_ok() {
                    let _ = wake_tx.try_send(());
                }
            })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    fn snapshot(&self) -> std::io::Result<HashMap<PathBuf, SystemTime>> {
        let mut snap = HashMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_match = entry.file_type()?.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&self.extension));
            if !is_match {
                continue;
            }
            // A file disappearing between listing and stat is just churn.
            if let Ok(meta) = entry.metadata() {
                if let Ok(mtime) = meta.modified() {
                    snap.insert(path, mtime);
                }
            }
        }
        Ok(snap)
    }
}

fn diff_snapshots(
    before: &HashMap<PathBuf, SystemTime>,
    after: &HashMap<PathBuf, SystemTime>,
    guard: Duration,
) -> WatchBatch {
    let mut batch = WatchBatch::default();
    for path in after.keys() {
        if !before.contains_key(path) {
            batch.added.push(path.clone());
        }
    }
    for (path, old_mtime) in before {
        match after.get(path) {
            None => batch.removed.push(path.clone()),
            Some(new_mtime) => {
                let advanced = new_mtime
                    .duration_since(*old_mtime)
                    .is_ok_and(|delta| delta > guard);
                if advanced {
                    batch.modified.push(path.clone());
                }
            }
        }
    }
    batch.added.sort();
    batch.modified.sort();
    batch.removed.sort();
    batch
}

/// Handle for stopping a spawned watcher.
pub struct WatcherHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signals the loop to stop and waits up to `timeout` for it to
    /// finish. Returns false on timeout, which callers must treat as
    /// "best-effort stopped", not an error. Idempotent.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let _ = self.stop_tx.try_send(());
        let Some(handle) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Watcher did not stop within timeout");
                self.thread = Some(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let _ = handle.join();
        true
    }
}
