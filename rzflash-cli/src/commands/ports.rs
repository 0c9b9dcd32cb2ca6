//! Serial port listing.

use console::style;
use rzflash::{DetectedPort, auto_detect_port, discover_ports};

fn port_json(port: &DetectedPort) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List ports command implementation.
///
/// JSON goes to stdout; the human-readable list goes to stderr.
pub(crate) fn cmd_list_ports(json: bool) {
    let detected = discover_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(port_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_else(|_| "[]".to_string())
        );
        return;
    }

    eprintln!("{}", style("Serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{device_type}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan(),
        );
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rzflash::DeviceKind;

    #[test]
    fn test_port_json_fields() {
        let port = DetectedPort {
            device: DeviceKind::Cp210x,
            vid: Some(0x10C4),
            pid: Some(0xEA60),
            product: Some("CP2102N USB to UART Bridge Controller".to_string()),
            ..DetectedPort::plain("/dev/ttyUSB0")
        };
        let value = port_json(&port);
        assert_eq!(value["name"], "/dev/ttyUSB0");
        assert_eq!(value["device"], "CP210x");
        assert_eq!(value["known"], true);
        assert_eq!(value["vid"], 0x10C4);
        assert!(value["serial"].is_null());
    }

    #[test]
    fn test_port_json_plain_port() {
        let value = port_json(&DetectedPort::plain("/dev/ttyS0"));
        assert_eq!(value["known"], false);
        assert!(value["vid"].is_null());
    }
}
