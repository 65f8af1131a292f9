//! Channel-backed native source.
//!
//! Forwards messages from a crossbeam receiver into the adapter sink on
//! a dedicated thread. Useful for tests and for embedders that already
//! receive the native stream some other way; a real DLL binding
//! implements [`NativeSource`](super::NativeSource) against the same
//! seam.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::debug;

use super::{NativeSource, SourceMessage, SourceSink};
use crate::error::{LgsError, Result};

pub struct ChannelSource {
    rx: Option<Receiver<String>>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<String>) -> Self {
        Self {
            rx: Some(rx),
            stop_tx: None,
            thread: None,
        }
    }
}

impl NativeSource for ChannelSource {
    fn connect(&mut self, sink: SourceSink) -> Result<()> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| LgsError::Adapter("channel source already consumed".to_string()))?;
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("lgsync-native".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(raw) => sink(SourceMessage::Event(raw)),
                            Err(_) => {
                                sink(SourceMessage::Closed);
                                break;
                            }
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("Channel source thread exiting");
            })
            .map_err(|e| LgsError::Adapter(format!("failed to spawn source thread: {e}")))?;
        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn disconnect(&mut self, timeout: Duration) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.thread = Some(handle);
                return Err(LgsError::AdapterDisconnectTimeout {
                    seconds: timeout.as_secs(),
                });
            }
            thread::sleep(Duration::from_millis(5));
        }
        let _ = handle.join();
        Ok(())
    }
}
