// src/display.rs
//
// Live console mirror of the event stream. Each port gets its own colour so
// interleaved traffic from several ports stays readable.

use crossterm::style::{Color, Stylize};
use std::collections::HashMap;

use crate::direction::DirectionLabel;
use crate::event::{format_ascii_dotted, format_hex, Event, EventKind};
use crate::io::serial::SerialPortInfo;
use crate::settings::{DisplayMode, PortConfig};

/// Colours handed out to ports in configuration order
const PORT_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::White,
];

const RULE_WIDTH: usize = 80;

struct PortStyle {
    device: String,
    color: Color,
}

pub struct ConsoleDisplay {
    mode: DisplayMode,
    show_direction: bool,
    ports: HashMap<String, PortStyle>,
}

impl ConsoleDisplay {
    pub fn new(ports: &[PortConfig], mode: DisplayMode, show_direction: bool) -> Self {
        let ports = ports
            .iter()
            .enumerate()
            .map(|(i, port)| {
                (
                    port.label.clone(),
                    PortStyle {
                        device: port.device.clone(),
                        color: PORT_COLORS[i % PORT_COLORS.len()],
                    },
                )
            })
            .collect();
        ConsoleDisplay {
            mode,
            show_direction,
            ports,
        }
    }

    pub fn show(&self, event: &Event) {
        println!("{}", self.render(event));
    }

    /// Styled text for one event, without the trailing newline
    pub fn render(&self, event: &Event) -> String {
        let (device, color) = match self.ports.get(&event.port) {
            Some(style) => (style.device.as_str(), style.color),
            None => ("?", Color::Grey),
        };
        let time = event.timestamp.format("%H:%M:%S%.3f");

        match &event.kind {
            EventKind::Frame { frame, direction } => {
                let mut lines = Vec::with_capacity(4);
                lines.push(format!("{}", "─".repeat(RULE_WIDTH).with(color)));

                let mut header = format!("[{}] {} ({})", time, event.port, device);
                if self.show_direction {
                    header.push_str(&format!(" {} {}", direction.arrow(), direction));
                }
                header.push_str(&format!(" | Length: {} bytes", frame.len()));
                if frame.incomplete {
                    header.push_str(" (partial)");
                }
                lines.push(format!("{}", header.with(color).bold()));

                if matches!(self.mode, DisplayMode::Hex | DisplayMode::Both) {
                    lines.push(format!("HEX:   {}", format_hex(&frame.bytes)));
                }
                if matches!(self.mode, DisplayMode::Ascii | DisplayMode::Both) {
                    lines.push(format!("ASCII: {}", format_ascii_dotted(&frame.bytes)));
                }
                lines.join("\n")
            }
            EventKind::Connected {
                baud_rate, line, ..
            } => format!(
                "{}",
                format!("[{}] {} connected to {} @ {} baud ({})", time, event.port, device, baud_rate, line)
                    .with(color)
            ),
            EventKind::Error { message } => format!(
                "{}",
                format!("[{}] {} error: {}", time, event.port, message).with(Color::Red)
            ),
            EventKind::Disconnected { reason } => format!(
                "{}",
                format!("[{}] {} disconnected: {}", time, event.port, reason).with(Color::DarkGrey)
            ),
        }
    }
}

/// Startup summary printed before the first event
pub fn banner(ports: &[PortConfig], strategy: &str, log_target: Option<&str>) -> String {
    let mut out = Vec::new();
    out.push("═".repeat(RULE_WIDTH));
    out.push(format!("serialtap {}", env!("CARGO_PKG_VERSION")));
    out.push("═".repeat(RULE_WIDTH));
    for (i, port) in ports.iter().enumerate() {
        let color = PORT_COLORS[i % PORT_COLORS.len()];
        out.push(format!(
            "{}",
            format!(
                "  {:<12} {} @ {} baud ({}, {:?})",
                port.label,
                port.device,
                port.baud_rate,
                port.line_settings(),
                port.link
            )
            .with(color)
        ));
    }
    out.push(format!("  Direction detection: {}", strategy));
    match log_target {
        Some(path) => out.push(format!("  Logging to: {}", path)),
        None => out.push("  Logging: disabled".to_string()),
    }
    out.push("  Press Ctrl-C to stop".to_string());
    out.push("═".repeat(RULE_WIDTH));
    out.join("\n")
}

/// Numbered list of the ports the OS reports, printed before the tap opens
/// its own so a mistyped device path is easy to spot
pub fn available_ports(ports: &[SerialPortInfo]) -> String {
    let mut out = vec!["Available serial ports:".to_string()];
    if ports.is_empty() {
        out.push("  No serial ports found".to_string());
    }
    for (i, port) in ports.iter().enumerate() {
        out.push(format!("  [{}] {}", i + 1, port.describe()));
    }
    out.join("\n")
}

/// Arrow legend line, kept separate so `--no-direction` can skip it
pub fn direction_legend() -> String {
    format!(
        "  {} {}  {} {}",
        DirectionLabel::Tx.arrow(),
        DirectionLabel::Tx,
        DirectionLabel::Rx.arrow(),
        DirectionLabel::Rx
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::Frame;
    use crate::settings::PayloadFormat;
    use chrono::Local;
    use std::time::Instant;

    fn ports() -> Vec<PortConfig> {
        vec![
            PortConfig::new("DeviceA", "/dev/ttyUSB0", 9600),
            PortConfig::new("DeviceB", "/dev/ttyUSB1", 115200),
        ]
    }

    fn frame_event(port: &str, bytes: &[u8], direction: DirectionLabel) -> Event {
        let now = Instant::now();
        let frame = Frame {
            port: port.to_string(),
            bytes: bytes.to_vec(),
            first_arrival: now,
            last_arrival: now,
            timestamp: Local::now(),
            incomplete: false,
        };
        Event::frame(frame, direction, PayloadFormat::Hex)
    }

    #[test]
    fn test_render_both() {
        let display = ConsoleDisplay::new(&ports(), DisplayMode::Both, true);
        let text = display.render(&frame_event("DeviceB", b"OK\r\n", DirectionLabel::Rx));
        assert!(text.contains("DeviceB (/dev/ttyUSB1) ← RX | Length: 4 bytes"));
        assert!(text.contains("HEX:   4F 4B 0D 0A"));
        assert!(text.contains("ASCII: OK.."));
    }

    #[test]
    fn test_render_hex_only_without_direction() {
        let display = ConsoleDisplay::new(&ports(), DisplayMode::Hex, false);
        let text = display.render(&frame_event("DeviceA", b"AB", DirectionLabel::Tx));
        assert!(text.contains("DeviceA (/dev/ttyUSB0) | Length: 2 bytes"));
        assert!(!text.contains("TX"));
        assert!(!text.contains("ASCII:"));
    }

    #[test]
    fn test_render_status_events() {
        let display = ConsoleDisplay::new(&ports(), DisplayMode::Both, true);
        let text = display.render(&Event::error("DeviceA", "port unavailable: gone"));
        assert!(text.contains("DeviceA error: port unavailable: gone"));
        let text = display.render(&Event::connected("DeviceB", "/dev/ttyUSB1", 115200, "8N1"));
        assert!(text.contains("DeviceB connected to /dev/ttyUSB1 @ 115200 baud (8N1)"));
    }

    #[test]
    fn test_banner_lists_ports() {
        let text = banner(&ports(), "alternating", Some("tapping.txt"));
        assert!(text.contains("/dev/ttyUSB1 @ 115200 baud (8N1, Generic)"));
        assert!(text.contains("Direction detection: alternating"));
        assert!(text.contains("Logging to: tapping.txt"));
    }

    #[test]
    fn test_available_ports_are_numbered() {
        let info = |name: &str| SerialPortInfo {
            port_name: name.to_string(),
            port_type: "Unknown".to_string(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        };
        let text = available_ports(&[info("/dev/ttyS0"), info("/dev/ttyS1")]);
        assert_eq!(
            text,
            "Available serial ports:\n  [1] /dev/ttyS0 [Unknown]\n  [2] /dev/ttyS1 [Unknown]"
        );
        assert!(available_ports(&[]).ends_with("No serial ports found"));
    }
}
