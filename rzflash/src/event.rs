//! Observability events.
//!
//! Every component reports progress and anomalies as discrete [`Event`]s
//! through an [`EventSink`] instead of printing. The library always mirrors
//! events into the `log` facade via [`LogSink`]; embedders add their own sink
//! (for example a progress bar) on top.

use crate::protocol::transfer::TransferResult;
use crate::scif::FlashCommand;
use log::{debug, info, trace, warn};
use std::time::Duration;

/// Recovery stage announced by [`Event::StageEntered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the ROM download-mode banner.
    DownloadMode,
    /// Sending the Flash Writer image to SRAM.
    LoadFlashWriter,
    /// UART speed negotiation.
    SpeedUp,
    /// Programming the firmware list.
    FirmwareBatch,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DownloadMode => write!(f, "Waiting for SCIF download mode"),
            Self::LoadFlashWriter => write!(f, "Loading Flash Writer"),
            Self::SpeedUp => write!(f, "UART speed negotiation"),
            Self::FirmwareBatch => write!(f, "Flashing firmware"),
        }
    }
}

/// A discrete progress or diagnostic event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A recovery stage started.
    StageEntered(Stage),
    /// Raw bytes read from the device.
    Received(Vec<u8>),
    /// A keyword arrived.
    KeywordMatched {
        /// Keyword text.
        keyword: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// An optional keyword did not arrive; execution continued.
    SoftTimeout {
        /// Command whose script was running.
        command: FlashCommand,
        /// Zero-based step index.
        step: usize,
        /// Keyword that did not arrive.
        keyword: String,
    },
    /// A payload transfer started.
    TransferStarted {
        /// Bytes to send, excluding any end marker.
        total: usize,
    },
    /// A chunk of payload was written.
    TransferProgress {
        /// Bytes sent so far.
        sent: usize,
        /// Total bytes.
        total: usize,
    },
    /// A payload transfer finished.
    TransferComplete(TransferResult),
    /// A command script started.
    CommandStarted(FlashCommand),
    /// A command script finished successfully.
    CommandSucceeded {
        /// Command that ran.
        command: FlashCommand,
        /// Whether any soft step missed its keyword.
        degraded: bool,
    },
    /// A command script aborted.
    CommandFailed {
        /// Command that ran.
        command: FlashCommand,
        /// Failure description.
        reason: String,
    },
    /// The host baud rate changed and was verified.
    SpeedChanged {
        /// Previous rate.
        from: u32,
        /// New rate.
        to: u32,
    },
    /// The host baud rate change could not be verified and was reverted.
    SpeedRolledBack {
        /// Rate restored.
        from: u32,
        /// Rate attempted.
        to: u32,
    },
    /// A firmware batch item started.
    ItemStarted {
        /// One-based position in the batch.
        index: usize,
        /// Batch length.
        total: usize,
        /// Display name.
        name: String,
    },
    /// A firmware batch item was skipped.
    ItemSkipped {
        /// Display name.
        name: String,
        /// Why it was skipped.
        reason: String,
    },
    /// A firmware batch item was programmed.
    ItemFlashed {
        /// Display name.
        name: String,
    },
}

/// Receiver of [`Event`]s.
pub trait EventSink {
    /// Handle one event. Must not block for long; it runs inside poll loops.
    fn emit(&mut self, event: &Event);
}

impl<F: FnMut(&Event)> EventSink for F {
    fn emit(&mut self, event: &Event) {
        self(event);
    }
}

/// Sink that forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    #[allow(clippy::cast_precision_loss)]
    fn emit(&mut self, event: &Event) {
        match event {
            Event::StageEntered(stage) => info!("{stage}"),
            Event::Received(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                let text = text.trim();
                if !text.is_empty() {
                    debug!("RX: {text}");
                }
            },
            Event::KeywordMatched { keyword, waited } => {
                debug!("Found {keyword:?} after {} ms", waited.as_millis());
            },
            Event::SoftTimeout {
                command,
                step,
                keyword,
            } => warn!("{command}: step {step} did not see {keyword:?}, continuing"),
            Event::TransferStarted { total } => debug!("Sending {total} bytes"),
            Event::TransferProgress { sent, total } => trace!("Sent {sent}/{total} bytes"),
            Event::TransferComplete(result) => info!(
                "Transferred {} bytes in {:.2}s ({:.0} bytes/s)",
                result.bytes_sent,
                result.elapsed.as_secs_f64(),
                result.bytes_per_second()
            ),
            Event::CommandStarted(command) => info!("Executing {command}"),
            Event::CommandSucceeded { command, degraded } => {
                if *degraded {
                    warn!("{command} completed, but some optional confirmations were missing");
                } else {
                    info!("{command} completed");
                }
            },
            Event::CommandFailed { command, reason } => warn!("{command} failed: {reason}"),
            Event::SpeedChanged { from, to } => info!("Baud rate changed: {from} -> {to}"),
            Event::SpeedRolledBack { from, to } => {
                warn!("Baud rate change to {to} not confirmed, reverted to {from}");
            },
            Event::ItemStarted { index, total, name } => info!("[{index}/{total}] {name}"),
            Event::ItemSkipped { name, reason } => warn!("Skipping {name}: {reason}"),
            Event::ItemFlashed { name } => info!("Flashed {name}"),
        }
    }
}

/// Fan-out sink: logs every event and forwards it to an optional observer.
pub(crate) struct Events {
    observer: Option<Box<dyn FnMut(&Event) + Send>>,
}

impl Events {
    pub(crate) fn new() -> Self {
        Self { observer: None }
    }

    pub(crate) fn set_observer(&mut self, observer: Box<dyn FnMut(&Event) + Send>) {
        self.observer = Some(observer);
    }
}

impl EventSink for Events {
    fn emit(&mut self, event: &Event) {
        LogSink.emit(event);
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |e: &Event| seen.push(e.clone());
            sink.emit(&Event::StageEntered(Stage::SpeedUp));
        }
        assert_eq!(seen, vec![Event::StageEntered(Stage::SpeedUp)]);
    }

    #[test]
    fn test_events_forwards_to_observer() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let mut events = Events::new();
        events.set_observer(Box::new(move |e| captured.lock().unwrap().push(e.clone())));

        events.emit(&Event::ItemFlashed {
            name: "bl2".into(),
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::LoadFlashWriter.to_string(), "Loading Flash Writer");
    }
}
