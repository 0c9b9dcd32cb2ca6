//! Chunked payload transfer.
//!
//! Flash Writer receives payloads as raw bytes with no framing. S-record
//! payloads are terminated by a `.` line; binary payloads are not terminated
//! at all, the device having been told the byte count beforehand.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{Event, EventSink};
use crate::port::Port;
use crate::protocol::keywords::SREC_END_MARKER;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Default chunk size for payload writes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Outcome of a completed transfer, for throughput reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    /// Payload bytes written, excluding the end marker.
    pub bytes_sent: usize,
    /// Wall time of the transfer.
    pub elapsed: Duration,
}

impl TransferResult {
    /// Average throughput.
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// What to send after the last payload chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndMarker {
    /// Nothing; the device already knows the length.
    #[default]
    None,
    /// `.` CR LF, ending an S-record load.
    SRecord,
}

impl EndMarker {
    /// Bytes of the marker.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Self::None => &[],
            Self::SRecord => SREC_END_MARKER,
        }
    }
}

/// Transfer parameters.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Bytes per write.
    pub chunk_size: usize,
    /// Trailer after the payload.
    pub end_marker: EndMarker,
}

impl TransferOptions {
    /// Options with the default chunk size.
    pub fn new(end_marker: EndMarker) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            end_marker,
        }
    }

    /// Override the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::new(EndMarker::None)
    }
}

/// Send an in-memory payload.
pub fn send_payload<P: Port + ?Sized>(
    port: &mut P,
    clock: &dyn Clock,
    sink: &mut dyn EventSink,
    data: &[u8],
    options: TransferOptions,
) -> Result<TransferResult> {
    send_from(port, clock, sink, data, data.len(), options)
}

/// Stream a file from disk.
pub fn send_file<P: Port + ?Sized>(
    port: &mut P,
    clock: &dyn Clock,
    sink: &mut dyn EventSink,
    path: &Path,
    options: TransferOptions,
) -> Result<TransferResult> {
    let file = File::open(path)
        .map_err(|e| Error::Transfer(format!("cannot open {}: {e}", path.display())))?;
    let total = file
        .metadata()
        .map_err(|e| Error::Transfer(format!("cannot stat {}: {e}", path.display())))?
        .len();
    let total = usize::try_from(total)
        .map_err(|_| Error::Transfer(format!("{} is too large", path.display())))?;
    send_from(port, clock, sink, file, total, options)
}

fn send_from<P: Port + ?Sized, R: Read>(
    port: &mut P,
    clock: &dyn Clock,
    sink: &mut dyn EventSink,
    mut source: R,
    total: usize,
    options: TransferOptions,
) -> Result<TransferResult> {
    if total == 0 {
        return Err(Error::Transfer("payload is empty".into()));
    }

    sink.emit(&Event::TransferStarted { total });
    let start = clock.now();
    let mut chunk = vec![0u8; options.chunk_size.max(1)];
    let mut sent = 0usize;

    loop {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }

        let n = source
            .read(&mut chunk)
            .map_err(|e| Error::Transfer(format!("read failed after {sent} bytes: {e}")))?;
        if n == 0 {
            break;
        }

        port.write_all_bytes(&chunk[..n])
            .map_err(|e| Error::Transfer(format!("write failed after {sent} bytes: {e}")))?;
        sent += n;
        sink.emit(&Event::TransferProgress {
            sent,
            total: total.max(sent),
        });
    }

    let marker = options.end_marker.bytes();
    if !marker.is_empty() {
        port.write_all_bytes(marker)
            .map_err(|e| Error::Transfer(format!("failed to send end marker: {e}")))?;
    }

    let result = TransferResult {
        bytes_sent: sent,
        elapsed: clock.since(start),
    };
    sink.emit(&Event::TransferComplete(result));
    Ok(result)
}
