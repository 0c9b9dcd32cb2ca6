//! # rzflash
//!
//! A library for recovering and flashing Renesas RZ devices over SCIF.
//!
//! RZ application processors strapped for SCIF download mode wait on UART0
//! for a program to run from SRAM. This crate drives that boot ROM and the
//! Flash Writer monitor it loads:
//!
//! - keyword-synchronized reading of the unframed console output
//! - chunked payload transfer with S-record end markers
//! - the `XLS2`, `XLS3`, `EM_W` and `EM_WB` programming commands
//! - UART speed negotiation with rollback
//! - a firmware batch and the complete recovery flow
//!
//! ## Supported SoCs
//!
//! RZ/G2L, RZ/G2LC, RZ/G2UL, RZ/V2L, RZ/A3UL, RZ/Five and RZ/G3S. Other RZ
//! parts running the same Flash Writer work as `generic`.
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use rzflash::{FirmwareItem, Recovery, RecoveryConfig, ScifSession, SocModel};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let firmware = vec![
//!         FirmwareItem::new("bl2_bp-smarc-rzg2l_pmic.srec", "qspi".into(), "srec".into())
//!             .with_program_address("0x11E00".parse()?),
//!         FirmwareItem::new("fip-smarc-rzg2l_pmic.srec", "qspi".into(), "srec".into())
//!             .with_program_address("0x0".parse()?)
//!             .with_flash_address("0x1D200".parse()?),
//!     ];
//!     let config = RecoveryConfig::new(
//!         SocModel::RzG2L,
//!         "Flash_Writer_SCIF_RZG2L_SMARC_PMIC_DDR4_2GB_1PCS.mot",
//!     )
//!     .with_firmware(firmware);
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let session = ScifSession::open("/dev/ttyUSB0", 115_200)?;
//!         let mut recovery = Recovery::new(session, config);
//!         let report = recovery.run()?;
//!         println!("Flashed: {:?}", report.batch.map(|b| b.flashed));
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod clock;
pub mod device;
pub mod error;
pub mod event;
pub mod port;
pub mod protocol;
pub mod recovery;
pub mod scif;
pub mod target;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    clock::{Clock, SystemClock},
    device::{DetectedPort, DeviceKind, auto_detect_port, discover_ports},
    error::{Error, Result},
    event::{Event, EventSink, LogSink, Stage},
    port::{Port, SerialConfig},
    protocol::{EndMarker, HexToken, KeywordReader, TransferOptions, TransferResult},
    recovery::{
        BatchReport, BatchTiming, FirmwareItem, ImageFormat, Recovery, RecoveryConfig,
        RecoveryReport, StorageTarget, flash_firmware_list,
    },
    scif::{CommandOutcome, CommandScript, FlashCommand, Payload, ScifSession},
    target::SocModel,
};
