// src/io/serial/link.rs
//
// The reader's view of a serial device. The reader only ever asks how many
// bytes are waiting, reads them, and clears stale input after an open, so the
// device sits behind two small traits and tests can substitute scripted links.

use serde::Serialize;

use crate::error::LinkError;
use crate::settings::PortConfig;

/// An open, read-only serial connection.
pub trait SerialLink: Send {
    /// Bytes waiting in the OS input buffer
    fn bytes_available(&mut self) -> Result<usize, LinkError>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing arrived within the
    /// handle's read timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Discard anything buffered before the tap attached
    fn clear_input(&mut self) -> Result<(), LinkError>;
}

/// Opens links for port configurations. Shared by every reader in a run.
pub trait LinkOpener: Send + Sync {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, LinkError>;
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// One-line description for `--list`
    pub fn describe(&self) -> String {
        let mut out = format!("{} [{}]", self.port_name, self.port_type);
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            out.push_str(&format!(" {:04X}:{:04X}", vid, pid));
        }
        let detail: Vec<&str> = [&self.manufacturer, &self.product, &self.serial_number]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .collect();
        if !detail.is_empty() {
            out.push_str(&format!(" - {}", detail.join(" ")));
        }
        out
    }
}
