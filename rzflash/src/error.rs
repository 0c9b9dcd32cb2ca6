//! Error types for rzflash.

use crate::scif::FlashCommand;
use std::io;
use thiserror::Error;

/// Result type for rzflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rzflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A mandatory keyword did not arrive before its deadline.
    #[error("{command}: step {step} timed out waiting for {keyword:?} (last bytes: {recent:?})")]
    HardTimeout {
        /// Command whose script was running.
        command: FlashCommand,
        /// Zero-based index of the failing step.
        step: usize,
        /// Keyword that never arrived.
        keyword: String,
        /// Most recent bytes received, lossily decoded.
        recent: String,
    },

    /// Payload could not be read or sent.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Configuration error (missing field, unknown target/format, missing file).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A baud rate change could not be confirmed and was rolled back.
    #[error("Baud rate change {from} -> {to} not confirmed, reverted to {from}")]
    Verification {
        /// Rate before the attempt (and after the rollback).
        from: u32,
        /// Rate that could not be verified.
        to: u32,
    },

    /// The host could not return to its original rate after an unconfirmed switch.
    ///
    /// The port may still be at `to`.
    #[error("Baud rate rollback {to} -> {from} failed: {reason}")]
    RollbackFailed {
        /// Rate the host tried to return to.
        from: u32,
        /// Rate the host was probing at.
        to: u32,
        /// Why the port refused the original rate.
        reason: String,
    },

    /// No serial port found.
    #[error("No serial port found")]
    DeviceNotFound,

    /// The ROM download-mode banner never appeared.
    #[error("SCIF download mode not detected")]
    DownloadModeNotDetected,

    /// The embedding application requested an abort.
    #[error("Interrupted")]
    Interrupted,
}
