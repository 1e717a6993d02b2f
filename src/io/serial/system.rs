// src/io/serial/system.rs
//
// OS serial ports through the `serialport` crate. Desktop targets only.

use std::io::Read;
use std::time::Duration;

use super::link::{LinkOpener, SerialLink, SerialPortInfo};
use super::utils::{to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits};
use crate::error::LinkError;
use crate::settings::PortConfig;

/// Read timeout on the OS handle. Kept minimal for byte-level timing resolution.
const READ_TIMEOUT: Duration = Duration::from_millis(1);

// ============================================================================
// Opening Ports
// ============================================================================

/// Opens real devices through the `serialport` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPorts;

impl LinkOpener for SystemPorts {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, LinkError> {
        let data_bits = to_serialport_data_bits(config.data_bits)?;
        let parity = to_serialport_parity(&config.parity)?;
        let stop_bits = to_serialport_stop_bits(config.stop_bits);

        let port = serialport::new(&config.device, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(READ_TIMEOUT)
            .open()?;

        Ok(Box::new(SystemLink { port }))
    }
}

struct SystemLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SystemLink {
    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// List the serial ports the OS knows about.
///
/// On macOS only the /dev/cu.* (calling unit) devices are listed: the
/// /dev/tty.* twins block on open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to enumerate ports: {}", e))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB",
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth", None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI", None, None, None, None, None),
                serialport::SerialPortType::Unknown => ("Unknown", None, None, None, None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type: port_type.to_string(),
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}
