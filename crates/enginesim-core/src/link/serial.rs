//! Serial port handling
//!
//! Opens the ECU link, either a local serial port or a TCP bridge to a
//! virtual ECU, and enumerates the ports available on this machine.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SerialChannel, SerialLink, TcpChannel};
use crate::config::LinkConfig;
use crate::error::{Result, SimError};

/// Prefix selecting a TCP link instead of a serial port
pub const TCP_PREFIX: &str = "tcp://";

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort key putting USB serial adapters first:
///  - ttyUSB* ports (sorted numerically by suffix)
///  - then ttyACM* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (2, num, basename.to_string());
    }
    (3, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: USB adapters the API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port with a bounded read timeout
pub fn open_port(name: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    serialport::new(name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => SimError::PortNotFound(name.to_string()),
            _ => SimError::SerialError(format!("{name}: {e}")),
        })
}

/// Configure a serial port as 8N1 without flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<()> {
    let serial_err = |e: serialport::Error| SimError::SerialError(e.to_string());
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(serial_err)?;
    port.set_parity(serialport::Parity::None).map_err(serial_err)?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(serial_err)?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(serial_err)?;

    // Keep DTR asserted; toggling it resets many dev boards
    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!("failed to set DTR high: {e} (continuing)");
    } else {
        debug!("DTR set high");
    }

    Ok(())
}

/// Open the ECU link described by `config`.
///
/// `tcp://host:port` connects to a virtual ECU; anything else is a serial
/// port name.
pub fn open_link(config: &LinkConfig) -> Result<Box<dyn SerialLink>> {
    let timeout = config.read_timeout();

    if let Some(addr) = config.port.strip_prefix(TCP_PREFIX) {
        let stream = TcpStream::connect(addr)
            .map_err(|e| SimError::SerialError(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        let mut link = TcpChannel::new(stream);
        link.set_timeout(timeout)?;
        info!(addr, "connected to TCP link");
        return Ok(Box::new(link));
    }

    let mut port = open_port(&config.port, config.baud_rate, timeout)?;
    configure_port(port.as_mut())?;
    info!(port = %config.port, baud = config.baud_rate, "serial port open");
    Ok(Box::new(SerialChannel::new(port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // This test just ensures the function doesn't panic
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyACM1",
            "/dev/ttyUSB1",
            "COM3",
            "/dev/ttyUSB0",
            "/dev/someport",
            "/dev/ttyUSB10",
        ];
        let mut ports: Vec<PortInfo> = names
            .into_iter()
            .map(|n| PortInfo::bare(n.to_string()))
            .collect();

        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<String> = ports.into_iter().map(|p| p.name).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/ttyUSB10",
                "/dev/ttyACM1",
                "COM3",
                "/dev/someport",
            ]
        );
    }

    #[test]
    fn test_open_missing_tcp_link_fails() {
        let config = LinkConfig {
            port: "tcp://127.0.0.1:1".to_string(),
            ..LinkConfig::default()
        };
        assert!(matches!(open_link(&config), Err(SimError::SerialError(_))));
    }
}
