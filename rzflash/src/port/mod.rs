//! Byte channel abstraction over the UART link.
//!
//! The protocol engine never touches `serialport` directly; it talks to a
//! [`Port`], which keeps the keyword reader, transfer engine and command
//! executor independent of the transport and lets tests substitute a
//! scripted device.
//!
//! ```text
//! +----------------------------------+
//! |  ScifSession (scripts, speed)    |
//! +----------------+-----------------+
//!                  |
//!   KeywordReader  |  transfer engine
//!                  v
//! +----------------+-----------------+
//! |            Port trait            |
//! +----------------+-----------------+
//!                  |
//!                  v
//! +----------------+-----------------+
//! |  NativePort (serialport, 8-N-1)  |
//! +----------------------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate the RZ boot ROM starts at.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Baud rate Flash Writer can switch to with `SUP`.
pub const HIGH_SPEED_BAUD: u32 = 921_600;

/// Rates the Flash Writer speed command understands.
pub const SUPPORTED_BAUDS: [u32; 2] = [DEFAULT_BAUD, HIGH_SPEED_BAUD];

/// Serial port configuration.
///
/// Framing is fixed to 8-N-1 without flow control, which is what SCIF
/// download mode uses.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout of the underlying driver.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_secs(3),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An exclusively owned, open serial connection.
///
/// A port closes when dropped; a session never closes its port itself.
pub trait Port: Read + Write + Send {
    /// Number of received bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> Result<usize>;

    /// Discard any received but unread bytes.
    fn clear_input(&mut self) -> Result<()>;

    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Get the port name/path.
    fn name(&self) -> &str;


    /// Write all bytes and flush.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(self, buf)?;
        Write::flush(self)?;
        Ok(())
    }

    /// Read everything currently available without blocking.
    fn read_available(&mut self) -> Result<Vec<u8>> {
        let available = self.bytes_to_read()?;
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; available];
        let n = Read::read(self, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn bytes_to_read(&mut self) -> Result<usize> {
        (**self).bytes_to_read()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        (**self).set_baud_rate(baud_rate)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(feature = "native")]
pub use native::NativePort;
