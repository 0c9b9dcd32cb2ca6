//! Configuration file support for rzflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (RZFLASH_*)
//! 3. Local config file (./rzflash.toml), or the file given with `--config`
//! 4. Global config file (~/.config/rzflash/config.toml)
//!
//! Known USB-UART bridges picked interactively are remembered separately in
//! `ports.toml` next to the global config.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::{debug, info, warn};
use rzflash::{FirmwareItem, HexToken, ImageFormat, RecoveryConfig, SocModel, StorageTarget};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::CliError;

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "rzflash.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// An address or sector written either as an integer or a hex string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HexValue {
    /// `address = 0x11E00` or `address = 73216`.
    Int(u64),
    /// `address = "0x11E00"` or `address = "11E00"`.
    Text(String),
}

impl HexValue {
    /// Normalize to the token sent on the wire.
    pub fn to_token(&self) -> rzflash::Result<HexToken> {
        match self {
            Self::Int(value) => Ok(HexToken::from_u64(*value)),
            Self::Text(text) => HexToken::parse(text),
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Initial baud rate.
    pub baud: Option<u32>,
    /// Negotiate 921600 baud after the Flash Writer is up.
    pub speed_up: Option<bool>,
}

/// Flash Writer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashWriterConfig {
    /// Flash Writer S-record image (`.mot`).
    pub path: Option<PathBuf>,
}

/// One `[[firmware]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Display name.
    pub name: Option<String>,
    /// Image file.
    pub path: PathBuf,
    /// Storage target: "qspi" or "emmc".
    pub target: String,
    /// Image format: "srec" or "bin".
    #[serde(default = "default_format")]
    pub format: String,
    /// Flash save address (QSPI).
    #[serde(default)]
    pub address: Option<HexValue>,
    /// Program top address.
    #[serde(default)]
    pub program_address: Option<HexValue>,
    /// eMMC partition.
    #[serde(default = "default_partition")]
    pub partition: u32,
    /// eMMC start sector.
    #[serde(default)]
    pub start_sector: Option<HexValue>,
}

fn default_format() -> String {
    "bin".to_string()
}

fn default_partition() -> u32 {
    1
}

impl FirmwareConfig {
    /// Convert to a batch item.
    pub fn to_item(&self) -> rzflash::Result<FirmwareItem> {
        let mut item = FirmwareItem::new(
            self.path.clone(),
            StorageTarget::from(self.target.as_str()),
            ImageFormat::from(self.format.as_str()),
        );
        if let Some(name) = &self.name {
            item = item.with_name(name.clone());
        }
        if let Some(address) = &self.address {
            item = item.with_flash_address(address.to_token()?);
        }
        if let Some(address) = &self.program_address {
            item = item.with_program_address(address.to_token()?);
        }
        let sector = match &self.start_sector {
            Some(sector) => sector.to_token()?,
            None => HexToken::from_u64(1),
        };
        Ok(item.with_emmc_location(self.partition, sector))
    }
}

/// Remembered ports, stored in `ports.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Known USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SoC model name ("rzg2l", "rzv2l", ...).
    pub soc: Option<String>,
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Flash Writer settings.
    #[serde(default)]
    pub flash_writer: FlashWriterConfig,
    /// Firmware batch, programmed in order.
    #[serde(default)]
    pub firmware: Vec<FirmwareConfig>,
    /// Remembered USB devices.
    #[serde(skip)]
    pub ports: PortsConfig,
}

impl Config {
    /// Load configuration from all available sources.
    ///
    /// Unreadable files are reported and skipped.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                match Self::load_from_file(&global_path) {
                    Ok(global_config) => {
                        debug!("Loaded global config from {}", global_path.display());
                        config.merge(global_config);
                    },
                    Err(e) => warn!("{e:#}"),
                }
            }
        }

        // Load local config (overrides global)
        let local_path = Path::new(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            match Self::load_from_file(local_path) {
                Ok(local_config) => {
                    debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
                    config.merge(local_config);
                },
                Err(e) => warn!("{e:#}"),
            }
        }

        config.ports = Self::load_ports_config().unwrap_or_default();
        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike [`Config::load`], a missing or malformed file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "config file {} does not exist",
                path.display()
            ))
            .into());
        }
        let mut config = Self::load_from_file(path)?;
        debug!("Loaded config from {}", path.display());
        config.ports = Self::load_ports_config().unwrap_or_default();
        Ok(config)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content, path.parent())
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())).into())
    }

    /// Parse TOML text.
    ///
    /// Relative image paths are joined onto `base_dir` here, so they keep
    /// pointing next to the file that declared them after a merge.
    pub fn parse(content: &str, base_dir: Option<&Path>) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        if let Some(base) = base_dir.filter(|dir| !dir.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(path) = self.flash_writer.path.as_mut() {
            resolve_path(path, base);
        }
        for entry in &mut self.firmware {
            resolve_path(&mut entry.path, base);
        }
    }

    /// Load remembered ports from the global `ports.toml`.
    fn load_ports_config() -> Option<PortsConfig> {
        let path = Self::global_config_dir()?.join("ports.toml");
        let content = fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(ports) => {
                debug!("Loaded ports config from {}", path.display());
                Some(ports)
            },
            Err(e) => {
                warn!("Failed to parse ports config {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rzflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    ///
    /// A non-empty firmware list replaces the current one as a whole.
    fn merge(&mut self, other: Self) {
        if other.soc.is_some() {
            self.soc = other.soc;
        }
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.connection.speed_up.is_some() {
            self.connection.speed_up = other.connection.speed_up;
        }
        if other.flash_writer.path.is_some() {
            self.flash_writer.path = other.flash_writer.path;
        }
        if !other.firmware.is_empty() {
            self.firmware = other.firmware;
        }
    }

    /// Resolve the SoC model, with `--soc` taking precedence.
    pub fn soc_model(&self, cli_soc: Option<&str>) -> Result<SocModel> {
        match cli_soc.or(self.soc.as_deref()) {
            None => Ok(SocModel::default()),
            Some(name) => SocModel::from_name(name).ok_or_else(|| {
                let known: Vec<String> = SocModel::ALL.iter().map(ToString::to_string).collect();
                CliError::Config(format!(
                    "unknown SoC {name:?} (known: {})",
                    known.join(", ")
                ))
                .into()
            }),
        }
    }

    /// Convert the firmware tables into batch items.
    pub fn firmware_items(&self) -> Result<Vec<FirmwareItem>> {
        self.firmware
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                entry.to_item().map_err(|e| {
                    CliError::Config(format!("firmware entry {}: {e}", index + 1)).into()
                })
            })
            .collect()
    }

    /// Build the recovery configuration. `flash_writer` and `speed_up`
    /// override the file when given.
    pub fn recovery_config(
        &self,
        soc: SocModel,
        flash_writer: Option<&Path>,
        no_speed_up: bool,
    ) -> Result<RecoveryConfig> {
        let flash_writer = match flash_writer {
            Some(path) => path.to_path_buf(),
            None => self
                .flash_writer
                .path
                .clone()
                .ok_or_else(|| {
                    CliError::Config(
                        "no Flash Writer image; set [flash_writer] path or pass --flash-writer"
                            .to_string(),
                    )
                })?,
        };
        let speed_up = !no_speed_up && self.connection.speed_up.unwrap_or(true);

        Ok(RecoveryConfig::new(soc, flash_writer)
            .with_speed_up(speed_up)
            .with_firmware(self.firmware_items()?))
    }

    /// Save USB device for future auto-detection.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> Result<()> {
        let device = UsbDevice { vid, pid };

        // Don't add duplicates
        if self.ports.usb_device.contains(&device) {
            return Ok(());
        }

        let global_dir = Self::global_config_dir()
            .context("Could not determine the configuration directory")?;
        fs::create_dir_all(&global_dir)?;
        let path = global_dir.join("ports.toml");

        self.ports.usb_device.push(device);

        let content = toml::to_string_pretty(&self.ports)?;
        fs::write(&path, content)?;
        info!("Saved USB device to {}", path.display());

        Ok(())
    }
}

fn resolve_path(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
