//! End-to-end recovery of a board sitting in SCIF download mode.
//!
//! The flow has four stages:
//!
//! 1. wait for the boot ROM banner (the board must be reset by the user);
//! 2. push the Flash Writer S-record image into SRAM and wait for its prompt;
//! 3. optionally raise the UART rate;
//! 4. optionally program a list of firmware images.
//!
//! The connection stays open afterwards, see [`Recovery::into_session`].

pub mod batch;

pub use batch::{
    BatchReport, BatchTiming, FirmwareItem, ImageFormat, StorageTarget, flash_firmware_list,
};

use crate::error::{Error, Result};
use crate::event::{Event, Stage};
use crate::port::{HIGH_SPEED_BAUD, Port};
use crate::protocol::keywords::{FLASH_WRITER_BANNER, PROMPT, SCIF_DOWNLOAD_MODE};
use crate::protocol::transfer::EndMarker;
use crate::scif::ScifSession;
use crate::target::SocModel;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// How long the user has to reset the board.
pub const DOWNLOAD_MODE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long Flash Writer may take to start after its image is sent.
pub const FLASH_WRITER_BANNER_TIMEOUT: Duration = Duration::from_secs(30);
/// How long to wait for the first prompt after the banner.
pub const FLASH_WRITER_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one recovery run. Fixed once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Target SoC.
    pub soc: SocModel,
    /// Flash Writer image (`.mot` S-record).
    pub flash_writer: PathBuf,
    /// Negotiate a faster UART rate after Flash Writer starts.
    pub speed_up: bool,
    /// Rate to negotiate.
    pub target_baud: u32,
    /// Images to program after Flash Writer starts.
    pub firmware: Vec<FirmwareItem>,
    /// Delays between images.
    pub batch_timing: BatchTiming,
}

impl RecoveryConfig {
    /// Configuration with speed-up enabled and no firmware list.
    pub fn new(soc: SocModel, flash_writer: impl Into<PathBuf>) -> Self {
        Self {
            soc,
            flash_writer: flash_writer.into(),
            speed_up: true,
            target_baud: HIGH_SPEED_BAUD,
            firmware: Vec::new(),
            batch_timing: BatchTiming::default(),
        }
    }

    /// Enable or disable the speed change.
    #[must_use]
    pub fn with_speed_up(mut self, speed_up: bool) -> Self {
        self.speed_up = speed_up;
        self
    }

    /// Set the firmware list.
    #[must_use]
    pub fn with_firmware(mut self, firmware: Vec<FirmwareItem>) -> Self {
        self.firmware = firmware;
        self
    }

    /// Set the inter-image delays.
    #[must_use]
    pub fn with_batch_timing(mut self, timing: BatchTiming) -> Self {
        self.batch_timing = timing;
        self
    }

    /// Check everything that can be checked without the device.
    pub fn validate(&self) -> Result<()> {
        if !self.flash_writer.is_file() {
            return Err(Error::Config(format!(
                "Flash Writer image not found: {}",
                self.flash_writer.display()
            )));
        }
        Ok(())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Flash Writer printed its banner.
    pub banner_seen: bool,
    /// Flash Writer printed its prompt.
    pub prompt_seen: bool,
    /// Host rate at the end of the run.
    pub baud_rate: u32,
    /// Batch results, when a firmware list was given.
    pub batch: Option<BatchReport>,
}

/// A recovery run on one connection.
pub struct Recovery<P: Port> {
    session: ScifSession<P>,
    config: RecoveryConfig,
}

impl<P: Port> Recovery<P> {
    /// Prepare a run.
    pub fn new(session: ScifSession<P>, config: RecoveryConfig) -> Self {
        Self { session, config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// The session, for interactive use mid-run.
    pub fn session_mut(&mut self) -> &mut ScifSession<P> {
        &mut self.session
    }

    /// Hand back the still open session.
    pub fn into_session(self) -> ScifSession<P> {
        self.session
    }

    /// Run every stage.
    pub fn run(&mut self) -> Result<RecoveryReport> {
        self.config.validate()?;
        info!("Starting {} recovery", self.config.soc);

        self.wait_for_download_mode()?;
        let (banner_seen, prompt_seen) = self.load_flash_writer()?;
        if self.config.speed_up {
            self.speed_up()?;
        }

        let batch = if self.config.firmware.is_empty() {
            info!("Flash Writer is running; no firmware list given");
            None
        } else {
            Some(flash_firmware_list(
                &mut self.session,
                &self.config.firmware,
                self.config.batch_timing,
            )?)
        };

        info!("{} recovery completed", self.config.soc);
        Ok(RecoveryReport {
            banner_seen,
            prompt_seen,
            baud_rate: self.session.baud_rate(),
            batch,
        })
    }

    /// Stage 1: wait for the boot ROM banner.
    pub fn wait_for_download_mode(&mut self) -> Result<()> {
        self.session
            .emit(&Event::StageEntered(Stage::DownloadMode));
        info!("Reset or power cycle the board now");
        if self
            .session
            .wait_for(SCIF_DOWNLOAD_MODE, DOWNLOAD_MODE_TIMEOUT)?
        {
            info!("SCIF download mode detected");
            Ok(())
        } else {
            Err(Error::DownloadModeNotDetected)
        }
    }

    /// Stage 2: send Flash Writer and wait for it to start.
    ///
    /// Returns whether the banner and the prompt were seen. Neither is
    /// required: some Flash Writer builds print a different banner.
    pub fn load_flash_writer(&mut self) -> Result<(bool, bool)> {
        self.session
            .emit(&Event::StageEntered(Stage::LoadFlashWriter));
        // The ROM printed its "please send" right after the banner.
        let result = self
            .session
            .send_file(&self.config.flash_writer, EndMarker::SRecord)?;
        info!(
            "Flash Writer sent ({} bytes in {:.1}s)",
            result.bytes_sent,
            result.elapsed.as_secs_f64()
        );

        let banner_seen = self
            .session
            .wait_for(FLASH_WRITER_BANNER, FLASH_WRITER_BANNER_TIMEOUT)?;
        if !banner_seen {
            warn!("Flash Writer banner not detected, continuing");
        }
        let prompt_seen = self
            .session
            .wait_for(PROMPT, FLASH_WRITER_PROMPT_TIMEOUT)?;
        if !prompt_seen {
            warn!("Flash Writer prompt not detected");
        }
        Ok((banner_seen, prompt_seen))
    }

    /// Stage 3: raise the UART rate. A refusal or failed probe only warns.
    pub fn speed_up(&mut self) -> Result<bool> {
        self.session.emit(&Event::StageEntered(Stage::SpeedUp));
        let original = self.session.baud_rate();
        match self.session.negotiate(self.config.target_baud) {
            Ok(changed) => {
                if !changed {
                    warn!("Speed change not supported, continuing at {original} bps");
                }
                Ok(changed)
            },
            Err(Error::Verification { from, to }) => {
                warn!("Could not verify {to} bps, continuing at {from} bps");
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;
    use crate::scif::test_support::session;
    use std::io::Write;

    const ROM_BANNER: &str = "\r\nSCIF Download mode\r\n (C) Renesas Electronics Corp.\r\n-- Load Program to System RAM ---------------\r\nplease send !\r\n";
    const FW_BANNER: &str = "\r\nFlash writer for RZ/G2 Series V1.06 Aug.10,2022\r\n Product Code : RZ/G2L\r\n>";

    fn flash_writer() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"S00E00005A5A5A5A5A5A5A5A5A5A5A\r\nS9030000FC\r\n")
            .unwrap();
        file
    }

    #[test]
    fn test_flash_writer_loaded() {
        let image = flash_writer();
        let port = MockPort::new()
            .with_output(ROM_BANNER.as_bytes())
            .on("S9030000FC\r\n.\r\n", FW_BANNER);
        let config = RecoveryConfig::new(SocModel::RzG2L, image.path()).with_speed_up(false);
        let mut recovery = Recovery::new(session(port), config);

        let report = recovery.run().unwrap();
        assert!(report.banner_seen);
        assert!(report.prompt_seen);
        assert_eq!(report.baud_rate, 115_200);
        assert!(report.batch.is_none());

        let port = recovery.into_session().into_port();
        assert!(port.written_text().ends_with("S9030000FC\r\n.\r\n"));
    }

    #[test]
    fn test_no_download_mode() {
        let image = flash_writer();
        let config = RecoveryConfig::new(SocModel::RzV2L, image.path());
        let mut recovery = Recovery::new(session(MockPort::new()), config);

        assert!(matches!(recovery.run(), Err(Error::DownloadModeNotDetected)));
        assert!(recovery.session_mut().port().written().is_empty());
    }

    #[test]
    fn test_missing_flash_writer_checked_first() {
        let port = MockPort::new().with_output(ROM_BANNER.as_bytes());
        let config = RecoveryConfig::new(SocModel::RzG2L, "/nonexistent/Flash_Writer.mot");
        let mut recovery = Recovery::new(session(port), config);

        assert!(matches!(recovery.run(), Err(Error::Config(_))));
        assert!(recovery.session_mut().port().written().is_empty());
    }

    #[test]
    fn test_speed_up_refusal_is_not_fatal() {
        let image = flash_writer();
        let port = MockPort::new()
            .with_output(ROM_BANNER.as_bytes())
            .on(".\r\n", FW_BANNER)
            .on("SUP\r\n", "command error\r\n>");
        let config = RecoveryConfig::new(SocModel::RzG2L, image.path());
        let mut recovery = Recovery::new(session(port), config);

        let report = recovery.run().unwrap();
        assert_eq!(report.baud_rate, 115_200);
    }

    #[test]
    fn test_speed_up_rollback_is_not_fatal() {
        let image = flash_writer();
        let port = MockPort::new()
            .with_output(ROM_BANNER.as_bytes())
            .on(".\r\n", FW_BANNER)
            .on("SUP\r\n", "Please change to 921.6Kbps baud rate");
        let config = RecoveryConfig::new(SocModel::RzG2L, image.path());
        let mut recovery = Recovery::new(session(port), config);

        let report = recovery.run().unwrap();
        assert_eq!(report.baud_rate, 115_200);
        assert_eq!(recovery.session_mut().port().baud_history(), &[921_600, 115_200]);
    }

    #[test]
    fn test_failed_rollback_aborts_run() {
        let image = flash_writer();
        let port = MockPort::new()
            .with_output(ROM_BANNER.as_bytes())
            .on(".\r\n", FW_BANNER)
            .on("SUP\r\n", "Please change to 921.6Kbps baud rate")
            .refuse_baud(115_200);
        let config = RecoveryConfig::new(SocModel::RzG2L, image.path());
        let mut recovery = Recovery::new(session(port), config);

        let err = recovery.run().unwrap_err();
        assert!(matches!(
            err,
            Error::RollbackFailed {
                from: 115_200,
                to: 921_600,
                ..
            }
        ));
    }

    #[test]
    fn test_full_run_with_firmware() {
        let image = flash_writer();
        let mut fip = tempfile::NamedTempFile::new().unwrap();
        fip.write_all(&[0xFF; 32]).unwrap();

        let port = MockPort::new()
            .with_output(ROM_BANNER.as_bytes())
            .on(".\r\n", FW_BANNER)
            .on("SUP\r\n", "Please change to 921.6Kbps baud rate")
            .on_at(921_600, "H\r\n", ">")
            .on_at(921_600, "XLS3\r\n", "Please Input Program size : ")
            .on_at(921_600, "20\r\n", "Please Input Qspi Save Address : ")
            .on_at(921_600, "1D200\r\n", "please send ! (binary)")
            .after_bytes(32, "Clear OK?(y/n)")
            .on("y\r\n", "Erase Completed\r\nSAVE SPI-FLASH.......\r\n>");
        let firmware = vec![
            FirmwareItem::new(fip.path(), StorageTarget::Qspi, ImageFormat::Bin)
                .with_name("fip")
                .with_flash_address(crate::HexToken::from(0x1D200u32)),
        ];
        let config = RecoveryConfig::new(SocModel::RzG2L, image.path()).with_firmware(firmware);
        let mut recovery = Recovery::new(session(port), config);

        let report = recovery.run().unwrap();
        assert_eq!(report.baud_rate, 921_600);
        let batch = report.batch.unwrap();
        assert_eq!(batch.flashed, vec!["fip".to_string()]);
        assert!(batch.degraded.is_empty());
    }
}
