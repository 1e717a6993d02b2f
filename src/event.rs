// src/event.rs
//
// Events flowing from the port readers to the writer, and the text encoding of
// the sink line: `<DIRECTION> : <timestamp> <payload>`.

use chrono::{DateTime, Local};

use crate::direction::DirectionLabel;
use crate::io::serial::Frame;
use crate::settings::PayloadFormat;

/// Millisecond-resolution local timestamp used in sink lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A classified frame
    Frame { frame: Frame, direction: DirectionLabel },
    /// The reader opened its port
    Connected { device: String, baud_rate: u32, line: String },
    /// Open or read failure; the reader is about to reconnect (or give up)
    Error { message: String },
    /// The reader released its port
    Disconnected { reason: String },
}

/// One record for the sink. Immutable once created: the formatted line is
/// produced at construction so the writer does no per-event work beyond I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub port: String,
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
    record: String,
}

impl Event {
    pub fn frame(frame: Frame, direction: DirectionLabel, format: PayloadFormat) -> Self {
        let payload = match format {
            PayloadFormat::Hex => format_hex(&frame.bytes),
            PayloadFormat::Ascii => format_ascii(&frame.bytes),
        };
        let port = frame.port.clone();
        let timestamp = frame.timestamp;
        Self::build(port, timestamp, EventKind::Frame { frame, direction }, payload)
    }

    pub fn connected(port: &str, device: &str, baud_rate: u32, line: &str) -> Self {
        let payload = format!("CONNECTED {} @ {} baud ({})", device, baud_rate, line);
        Self::build(
            port.to_string(),
            Local::now(),
            EventKind::Connected {
                device: device.to_string(),
                baud_rate,
                line: line.to_string(),
            },
            payload,
        )
    }

    pub fn error(port: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let payload = format!("ERROR {}", message);
        Self::build(port.to_string(), Local::now(), EventKind::Error { message }, payload)
    }

    pub fn disconnected(port: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let payload = format!("DISCONNECTED {}", reason);
        Self::build(
            port.to_string(),
            Local::now(),
            EventKind::Disconnected { reason },
            payload,
        )
    }

    fn build(port: String, timestamp: DateTime<Local>, kind: EventKind, payload: String) -> Self {
        let tag = match &kind {
            EventKind::Frame {
                direction: DirectionLabel::Tx,
                ..
            } => "TX".to_string(),
            EventKind::Frame {
                direction: DirectionLabel::Rx,
                ..
            } => "RX".to_string(),
            _ => format!("[{}]", port),
        };
        let record = format!("{} : {} {}", tag, timestamp.format(TIMESTAMP_FORMAT), payload);
        Event {
            port,
            timestamp,
            kind,
            record,
        }
    }

    /// Sink line, without the trailing newline
    pub fn record(&self) -> &str {
        &self.record
    }

    /// Direction of a frame event; status events have none
    pub fn direction(&self) -> DirectionLabel {
        match &self.kind {
            EventKind::Frame { direction, .. } => *direction,
            _ => DirectionLabel::Unknown,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self.kind, EventKind::Frame { .. })
    }
}

// ============================================================================
// Payload Encoding
// ============================================================================

/// Space-separated uppercase hex pairs: `48 65 6C`
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Printable ASCII verbatim, everything else as `[0D]`
pub fn format_ascii(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if (32..127).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("[{:02X}]", b));
        }
    }
    out
}

/// Printable ASCII with `.` for everything else, for side-by-side display
pub fn format_ascii_dotted(data: &[u8]) -> String {
    data.iter()
        .map(|&b| if (32..127).contains(&b) { b as char } else { '.' })
        .collect()
}
