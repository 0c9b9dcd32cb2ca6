//! Serial port discovery and classification.
//!
//! RZ evaluation and SMARC carrier boards expose SCIF0 through an on-board
//! USB-UART bridge (CP2102N on most SMARC carriers, FTDI on older EVKs).
//! Discovery lists every serial port and tags the ones behind a known bridge.

use crate::error::{Error, Result};
use log::info;

#[cfg(feature = "native")]
use log::{debug, trace};

/// Known USB-UART bridge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// Silicon Labs CP210x.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232.
    Ftdi,
    /// CH340/CH341.
    Ch340,
    /// Prolific PL2303.
    Prolific,
    /// Anything else.
    Unknown,
}

/// Known USB VID/PID pairs for common USB-to-UART bridges.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_USB_DEVICES
            .iter()
            .find(|(known_vid, pids, _)| vid == *known_vid && pids.contains(&pid))
            .map_or(Self::Unknown, |(_, _, device)| *device)
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Ch340 => "CH340/CH341",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this is a recognized bridge.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Bridges fitted on Renesas boards, preferred during auto-selection.
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::Cp210x | Self::Ftdi)
    }
}

/// A discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port path (e.g. "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Classified bridge.
    pub device: DeviceKind,
    /// USB Vendor ID, if USB.
    pub vid: Option<u16>,
    /// USB Product ID, if USB.
    pub pid: Option<u16>,
    /// Manufacturer string, if reported.
    pub manufacturer: Option<String>,
    /// Product string, if reported.
    pub product: Option<String>,
    /// Serial number, if reported.
    pub serial: Option<String>,
}

impl DetectedPort {
    /// A port with no USB metadata.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }
}

/// List all serial ports with metadata.
#[cfg(feature = "native")]
pub fn discover_ports() -> Vec<DetectedPort> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|port_info| {
                let mut detected = DetectedPort::plain(port_info.port_name.clone());
                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.manufacturer = usb_info.manufacturer;
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.device
                    );
                }
                detected
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// List all serial ports (no serial backend compiled in).
#[cfg(not(feature = "native"))]
pub fn discover_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick the best port candidate.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let port = select_best(discover_ports())?;
    if port.device.is_known() {
        info!(
            "Auto-detected {} USB-UART bridge: {}",
            port.device.name(),
            port.name
        );
    } else {
        info!("Using first available port: {}", port.name);
    }
    Ok(port)
}

/// Preference order: board bridges, other known bridges, anything.
pub fn select_best(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    if let Some(port) = ports.iter().find(|p| p.device.is_high_priority()) {
        return Ok(port.clone());
    }
    if let Some(port) = ports.iter().find(|p| p.device.is_known()) {
        return Ok(port.clone());
    }
    ports.into_iter().next().ok_or(Error::DeviceNotFound)
}
