//! Flash Writer conversation over SCIF.
//!
//! [`ScifSession`] owns the serial connection for the whole recovery run and
//! is the only thing that talks to it. Everything that happens on the wire
//! goes through the session: keyword waits, line sends, payload transfers,
//! command scripts ([`script`]) and the speed change ([`speed`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use rzflash::scif::{CommandScript, Payload, ScifSession};
//! use rzflash::HexToken;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = ScifSession::open("/dev/ttyUSB0", 115_200)?;
//!     session.negotiate(921_600)?;
//!
//!     let script = CommandScript::xls3(
//!         Payload::File("fip-smarc-rzg2l.bin".into()),
//!         HexToken::parse("0x1D200")?,
//!     )?;
//!     let outcome = session.run(&script)?;
//!     assert!(!outcome.is_degraded());
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod script;
pub mod speed;

pub use commands::FlashCommand;
pub use script::{CommandOutcome, CommandScript, Payload, Policy, SoftMiss, Step};
pub use speed::SpeedTiming;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::event::{Event, EventSink, Events};
use crate::port::Port;
use crate::protocol::keywords::CRLF;
use crate::protocol::reader::{DEFAULT_POLL_INTERVAL, DEFAULT_WINDOW, KeywordReader};
use crate::protocol::transfer::{self, EndMarker, TransferOptions, TransferResult};
use log::{debug, trace};
use std::path::Path;
use std::time::Duration;

/// Number of trailing received bytes attached to protocol errors.
pub const DIAGNOSTIC_TAIL: usize = 128;

/// An open SCIF connection and the conversation state on it.
///
/// Generic over the port type `P`, so tests can drive it with a scripted
/// device.
pub struct ScifSession<P: Port> {
    port: P,
    clock: Box<dyn Clock>,
    reader: KeywordReader,
    events: Events,
    chunk_size: usize,
    speed_timing: SpeedTiming,
}

impl<P: Port> ScifSession<P> {
    /// Wrap an already open port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            clock: Box::new(SystemClock::new()),
            reader: KeywordReader::new(DEFAULT_WINDOW, DEFAULT_POLL_INTERVAL),
            events: Events::new(),
            chunk_size: transfer::DEFAULT_CHUNK_SIZE,
            speed_timing: SpeedTiming::default(),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Receive every event in addition to the `log` output.
    #[must_use]
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.events.set_observer(Box::new(observer));
        self
    }

    /// Change the poll interval and receive window size.
    #[must_use]
    pub fn with_reader(mut self, window: usize, poll_interval: Duration) -> Self {
        self.reader = KeywordReader::new(window, poll_interval);
        self
    }

    /// Change the payload chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Change the speed negotiation delays.
    #[must_use]
    pub fn with_speed_timing(mut self, timing: SpeedTiming) -> Self {
        self.speed_timing = timing;
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give the still open port back, for interactive use after recovery.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Current host baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.port.baud_rate()
    }

    /// Send `text` followed by CR LF.
    pub fn send_line(&mut self, text: &str) -> Result<()> {
        trace!("TX: {text}");
        let mut line = Vec::with_capacity(text.len() + CRLF.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(CRLF);
        self.port.write_all_bytes(&line)
    }

    /// Wait for `keyword`; `Ok(false)` on timeout.
    pub fn wait_for(&mut self, keyword: &[u8], timeout: Duration) -> Result<bool> {
        self.reader.wait_for(
            &mut self.port,
            self.clock.as_ref(),
            &mut self.events,
            keyword,
            timeout,
        )
    }

    /// Drain whatever arrives during `duration`.
    pub fn read_for(&mut self, duration: Duration) -> Result<Vec<u8>> {
        self.reader.read_for(
            &mut self.port,
            self.clock.as_ref(),
            &mut self.events,
            duration,
        )
    }

    /// Discard pending input, both in the driver and in the receive window.
    pub fn flush_input(&mut self) -> Result<()> {
        self.reader.flush_input(&mut self.port)?;
        debug!("Input buffer flushed");
        Ok(())
    }

    /// Stream a file to the device.
    pub fn send_file(&mut self, path: &Path, end_marker: EndMarker) -> Result<TransferResult> {
        debug!("Sending file: {}", path.display());
        let options = TransferOptions::new(end_marker).with_chunk_size(self.chunk_size);
        transfer::send_file(
            &mut self.port,
            self.clock.as_ref(),
            &mut self.events,
            path,
            options,
        )
    }

    /// Send an in-memory payload.
    pub fn send_payload(&mut self, data: &[u8], end_marker: EndMarker) -> Result<TransferResult> {
        let options = TransferOptions::new(end_marker).with_chunk_size(self.chunk_size);
        transfer::send_payload(
            &mut self.port,
            self.clock.as_ref(),
            &mut self.events,
            data,
            options,
        )
    }

    /// Block for `duration` on the session clock.
    pub fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    /// Most recent received bytes, for diagnostics.
    pub fn recent_output(&self) -> String {
        self.reader.tail(DIAGNOSTIC_TAIL)
    }

    /// Publish an event.
    pub fn emit(&mut self, event: &Event) {
        self.events.emit(event);
    }
}

#[cfg(feature = "native")]
mod native_impl {
    use super::ScifSession;
    use crate::error::Result;
    use crate::port::{NativePort, SerialConfig};
    use log::info;

    impl ScifSession<NativePort> {
        /// Open `port_name` at `baud_rate` (8-N-1, no flow control).
        pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
            Self::open_with_config(&SerialConfig::new(port_name, baud_rate))
        }

        /// Open with a full serial configuration.
        pub fn open_with_config(config: &SerialConfig) -> Result<Self> {
            let port = NativePort::open(config)?;
            info!(
                "Opened SCIF connection on {} at {} bps",
                config.port_name, config.baud_rate
            );
            Ok(Self::new(port))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ScifSession;
    use crate::clock::virtual_clock::VirtualClock;
    use crate::port::mock::MockPort;

    pub(crate) fn session(port: MockPort) -> ScifSession<MockPort> {
        ScifSession::new(port).with_clock(Box::new(VirtualClock::new()))
    }
}
