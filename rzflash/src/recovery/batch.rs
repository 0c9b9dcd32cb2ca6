//! Firmware batch: program a list of images one after the other.

use crate::error::{Error, Result};
use crate::event::{Event, Stage};
use crate::port::Port;
use crate::protocol::hex::HexToken;
use crate::scif::commands::EmmcLocation;
use crate::scif::{CommandScript, FlashCommand, Payload, ScifSession};
use log::info;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage an image is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    /// Serial NOR flash behind the QSPI controller.
    Qspi,
    /// eMMC.
    Emmc,
    /// Anything else from the configuration; such items are skipped.
    Other(String),
}

impl From<&str> for StorageTarget {
    fn from(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "qspi" => Self::Qspi,
            "emmc" => Self::Emmc,
            _ => Self::Other(name.to_owned()),
        }
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qspi => write!(f, "QSPI"),
            Self::Emmc => write!(f, "eMMC"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Image file format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// Motorola S-record text.
    Srec,
    /// Raw binary.
    #[default]
    Bin,
    /// Anything else from the configuration; such items are skipped.
    Other(String),
}

impl From<&str> for ImageFormat {
    fn from(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "srec" => Self::Srec,
            "bin" => Self::Bin,
            _ => Self::Other(name.to_owned()),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Srec => write!(f, "SREC"),
            Self::Bin => write!(f, "BIN"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// One image to program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareItem {
    /// Display name; the file name when absent.
    pub name: Option<String>,
    /// Image file.
    pub path: PathBuf,
    /// Destination storage.
    pub target: StorageTarget,
    /// File format.
    pub format: ImageFormat,
    /// QSPI save address.
    pub flash_address: HexToken,
    /// Load address reported to Flash Writer (XLS2 and eMMC).
    pub program_address: HexToken,
    /// eMMC partition (area) index.
    pub partition: u32,
    /// eMMC start sector.
    pub start_sector: HexToken,
}

impl FirmwareItem {
    /// Item with default addresses: flash and program address 0, partition 1, sector 1.
    pub fn new(path: impl Into<PathBuf>, target: StorageTarget, format: ImageFormat) -> Self {
        Self {
            name: None,
            path: path.into(),
            target,
            format,
            flash_address: HexToken::from(0u32),
            program_address: HexToken::from(0u32),
            partition: 1,
            start_sector: HexToken::from(1u32),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the QSPI save address.
    #[must_use]
    pub fn with_flash_address(mut self, address: HexToken) -> Self {
        self.flash_address = address;
        self
    }

    /// Set the program address.
    #[must_use]
    pub fn with_program_address(mut self, address: HexToken) -> Self {
        self.program_address = address;
        self
    }

    /// Set the eMMC partition and start sector.
    #[must_use]
    pub fn with_emmc_location(mut self, partition: u32, start_sector: HexToken) -> Self {
        self.partition = partition;
        self.start_sector = start_sector;
        self
    }

    /// Name shown in logs and reports.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_name()
                .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
        })
    }

    /// Command for this target and format, or why there is none.
    pub fn resolve(&self) -> std::result::Result<FlashCommand, String> {
        match (&self.target, &self.format) {
            (StorageTarget::Qspi, ImageFormat::Srec) => Ok(FlashCommand::Xls2),
            (StorageTarget::Qspi, ImageFormat::Bin) => Ok(FlashCommand::Xls3),
            (StorageTarget::Emmc, ImageFormat::Srec) => Ok(FlashCommand::EmW),
            (StorageTarget::Emmc, ImageFormat::Bin) => Ok(FlashCommand::EmWb),
            (StorageTarget::Other(target), _) => Err(format!("unknown target '{target}'")),
            (target, ImageFormat::Other(format)) => {
                Err(format!("unsupported format '{format}' for {target}"))
            },
        }
    }

    /// Build the script for `command`.
    pub fn script(&self, command: FlashCommand) -> Result<CommandScript> {
        let payload = Payload::File(self.path.clone());
        let location = EmmcLocation {
            partition: self.partition,
            start_sector: self.start_sector.clone(),
            program_address: self.program_address.clone(),
        };
        Ok(match command {
            FlashCommand::Xls2 => CommandScript::xls2(
                payload,
                self.program_address.clone(),
                self.flash_address.clone(),
            ),
            FlashCommand::Xls3 => CommandScript::xls3(payload, self.flash_address.clone())?,
            FlashCommand::EmW => CommandScript::em_w(payload, &location),
            FlashCommand::EmWb => CommandScript::em_wb(payload, &location),
        })
    }
}

/// Delays between batch items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTiming {
    /// Wait after a write before probing the prompt.
    pub settle: Duration,
    /// Wait after the `H` probe before flushing its output.
    pub probe_wait: Duration,
}

impl Default for BatchTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            probe_wait: Duration::from_secs(1),
        }
    }
}

/// What happened to each item of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items programmed.
    pub flashed: Vec<String>,
    /// Items skipped, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Programmed items whose completion was not confirmed by the device.
    pub degraded: Vec<String>,
}

/// Program `items` in order.
///
/// Items with an unknown target or format are skipped. A missing image file
/// aborts the batch before anything is sent for that item; items already
/// programmed stay programmed.
pub fn flash_firmware_list<P: Port>(
    session: &mut ScifSession<P>,
    items: &[FirmwareItem],
    timing: BatchTiming,
) -> Result<BatchReport> {
    session.emit(&Event::StageEntered(Stage::FirmwareBatch));
    let total = items.len();
    let mut report = BatchReport::default();
    info!("Flashing {total} firmware file(s)");

    for (idx, item) in items.iter().enumerate() {
        let name = item.display_name();
        session.emit(&Event::ItemStarted {
            index: idx + 1,
            total,
            name: name.clone(),
        });

        let size = check_image(&item.path)?;
        info!(
            "{}: {} bytes, {} {}",
            item.path.display(),
            size,
            item.target,
            item.format
        );

        let command = match item.resolve() {
            Ok(command) => command,
            Err(reason) => {
                session.emit(&Event::ItemSkipped {
                    name: name.clone(),
                    reason: reason.clone(),
                });
                report.skipped.push((name, reason));
                continue;
            },
        };

        let outcome = session.run(&item.script(command)?)?;
        session.emit(&Event::ItemFlashed { name: name.clone() });
        if outcome.is_degraded() {
            report.degraded.push(name.clone());
        }
        report.flashed.push(name);

        if idx + 1 < total {
            // Let Flash Writer return to its prompt before the next command.
            session.sleep(timing.settle);
            session.send_line("H")?;
            session.sleep(timing.probe_wait);
            session.flush_input()?;
        }
    }

    info!(
        "Batch done: {} flashed, {} skipped",
        report.flashed.len(),
        report.skipped.len()
    );
    Ok(report)
}

fn check_image(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| Error::Config(format!("firmware file not found: {}", path.display())))?;
    if !metadata.is_file() {
        return Err(Error::Config(format!(
            "firmware path is not a file: {}",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(Error::Config(format!(
            "firmware file is empty: {}",
            path.display()
        )));
    }
    Ok(metadata.len())
}
