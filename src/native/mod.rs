//! Native event adapter.
//!
//! An optional push source (the LGS debug-interceptor library on
//! Windows) reports profile switches, memory-slot changes and raw button
//! activity as `action.device.argument` strings. This module owns the
//! binding seam: [`NativeSource`] abstracts the transport, the adapter
//! parses and filters the stream and forwards structured events. When a
//! source is linked its profile activations are authoritative and the
//! controller suspends the size/timestamp heuristic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;

mod source;

pub use source::ChannelSource;

/// Default bound on how long a disconnect may take before it is
/// reported as failed instead of hanging.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Structured event decoded from the native stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    /// A profile was activated. Authoritative; no heuristic needed.
    ProfileActivated { device: String, profile: String },
    /// A device switched its active memory slot.
    ShiftState { device: String, slot: u8 },
    /// Raw button press/release, forwarded verbatim outward.
    Button {
        device: String,
        key: String,
        pressed: bool,
    },
}

/// Decodes one `action.device.argument` message. The argument may itself
/// contain dots (profile names); only the first two separators split.
pub fn parse_event(raw: &str) -> Option<NativeEvent> {
    let mut parts = raw.splitn(3, '.');
    let action = parts.next()?;
    let device = parts.next()?.to_string();
    let argument = parts.next()?;
    if device.is_empty() || argument.is_empty() {
        return None;
    }
    match action {
        "profile" => Some(NativeEvent::ProfileActivated {
            device,
            profile: argument.to_string(),
        }),
        "mstate" => argument
            .parse::<u8>()
            .ok()
            .map(|slot| NativeEvent::ShiftState { device, slot }),
        "keydown" | "keyup" => Some(NativeEvent::Button {
            device,
            key: argument.to_string(),
            pressed: action == "keydown",
        }),
        _ => None,
    }
}

/// Action-prefix filter applied before parsing. An empty filter passes
/// everything; otherwise the first dotted component must match one of
/// the configured actions. Shared between the adapter and a live
/// connection so reconfiguration applies immediately.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    actions: Arc<RwLock<Vec<String>>>,
}

impl EventFilter {
    pub fn set(&self, actions: Vec<String>) {
        *self.actions.write().expect("event filter poisoned") = actions;
    }

    pub fn passes(&self, raw: &str) -> bool {
        let actions = self.actions.read().expect("event filter poisoned");
        if actions.is_empty() {
            return true;
        }
        let action = raw.split('.').next().unwrap_or(raw);
        actions.iter().any(|a| a == action)
    }
}

/// What the adapter hands to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// A decoded native event.
    Native(NativeEvent),
    /// The source went away (irrecoverable error or upstream shutdown).
    /// The connection is released; heuristics take over.
    LinkDown,
}

/// Raw message delivered by a [`NativeSource`] into the adapter.
pub enum SourceMessage {
    Event(String),
    /// The source hit an irrecoverable error or its far end closed.
    Closed,
}

/// Sink handed to a source on connect.
pub type SourceSink = Box<dyn Fn(SourceMessage) + Send + Sync>;

/// Transport seam to the native library. Implementations deliver raw
/// message strings from their own execution context; the adapter never
/// depends on the binding mechanism.
pub trait NativeSource: Send {
    /// Establishes the connection and starts delivering messages into
    /// `sink`. Must not block beyond connection setup.
    fn connect(&mut self, sink: SourceSink) -> Result<()>;

    /// Tears the connection down, waiting at most `timeout`. Past the
    /// bound, implementations return
    /// [`crate::error::LgsError::AdapterDisconnectTimeout`] rather than
    /// hanging.
    fn disconnect(&mut self, timeout: Duration) -> Result<()>;
}

/// Owns one native source connection as a scoped resource.
pub struct NativeAdapter {
    source: Box<dyn NativeSource>,
    filter: EventFilter,
    connected: Arc<AtomicBool>,
    disconnect_timeout: Duration,
}

impl NativeAdapter {
    pub fn new(source: Box<dyn NativeSource>) -> Self {
        Self {
            source,
            filter: EventFilter::default(),
            connected: Arc::new(AtomicBool::new(false)),
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }

    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// True while a source connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Reconfigures which event kinds the adapter pays attention to.
    /// Applies to a live connection immediately.
    pub fn set_filter(&self, actions: Vec<String>) {
        debug!(?actions, "Native event filter updated");
        self.filter.set(actions);
    }

    /// Acquires the source connection. `deliver` is invoked from the
    /// source's execution context for every decoded event and once with
    /// [`AdapterEvent::LinkDown`] if the source dies.
    pub fn connect(
        &mut self,
        deliver: impl Fn(AdapterEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let filter = self.filter.clone();
        let connected = Arc::clone(&self.connected);
        let sink: SourceSink = Box::new(move |msg| match msg {
            SourceMessage::Event(raw) => {
                if !filter.passes(&raw) {
                    return;
                }
                match parse_event(&raw) {
                    Some(event) => deliver(AdapterEvent::Native(event)),
                    None => debug!(raw, "Ignoring unrecognized native event"),
                }
            }
            SourceMessage::Closed => {
                warn!("Native event source closed");
                connected.store(false, Ordering::SeqCst);
                deliver(AdapterEvent::LinkDown);
            }
        });
        self.source.connect(sink)?;
        self.connected.store(true, Ordering::SeqCst);
        info!("Native event source connected");
        Ok(())
    }

    /// Releases the connection, bounded by the disconnect timeout.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.connected.store(false, Ordering::SeqCst);
        let result = self.source.disconnect(self.disconnect_timeout);
        if let Err(e) = &result {
            warn!(error = %e, "Native event source disconnect failed");
        } else {
            info!("Native event source disconnected");
        }
        result
    }
}

impl Drop for NativeAdapter {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.source.disconnect(self.disconnect_timeout);
        }
    }
}
