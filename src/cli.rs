// src/cli.rs
//
// Command-line surface of the `serialtap` binary. Command-line values are
// layered over an optional TOML settings file; ports given with `-p` are added
// to the ones the file lists.

use chrono::{DateTime, Local};
use clap::Parser;
use std::path::PathBuf;

use crate::direction::DirectionLabel;
use crate::error::TapError;
use crate::io::serial::Parity;
use crate::settings::{
    load_settings, DetectionMode, DisplayMode, LinkKind, PayloadFormat, PortConfig, StopBits,
    TapSettings,
};

/// Baud rate for `-p` ports that don't carry their own
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Prefix of the generated capture filename
pub const DEFAULT_LOG_PREFIX: &str = "tapping";

/// Passive multi-port serial line tap.
///
/// Port format: PATH[:LABEL[:BAUD]], e.g. /dev/ttyUSB0:PLC:19200.
/// Log names may use {date}, {time}, {datetime} and {timestamp}.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "serialtap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Port to tap: PATH[:LABEL[:BAUD]]. Repeat for several ports.
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub ports: Vec<String>,

    /// Baud rate for ports without one in their spec
    #[arg(short = 'b', long)]
    pub baudrate: Option<u32>,

    /// Data bits (5-8)
    #[arg(long, value_parser = clap::value_parser!(u8).range(5..=8))]
    pub bytesize: Option<u8>,

    /// Parity: N, E, O, M or S
    #[arg(long)]
    pub parity: Option<Parity>,

    /// Stop bits: 1, 1.5 or 2
    #[arg(long)]
    pub stopbits: Option<StopBits>,

    /// Treat command-line ports as a shared addressed bus (RS-485)
    #[arg(long)]
    pub multidrop: bool,

    /// Console display: hex, ascii or both
    #[arg(short = 'd', long = "display")]
    pub display_mode: Option<DisplayMode>,

    /// Don't mirror events to the console
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Capture file. Without a value a timestamped name is generated.
    #[arg(short = 'l', long = "log", value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    pub log_file: Option<String>,

    /// Payload encoding in the capture file: hex or ascii
    #[arg(long)]
    pub log_format: Option<PayloadFormat>,

    /// Silence (ms) that ends a frame
    #[arg(long, value_name = "MS")]
    pub packet_timeout: Option<u64>,

    /// Direction detection: alternating, pattern, size, timing, address, auto, none
    #[arg(short = 'm', long)]
    pub mode: Option<DetectionMode>,

    /// Label for each port's first frame: tx or rx
    #[arg(long)]
    pub initial_label: Option<DirectionLabel>,

    /// Don't realign the alternating fallback after evidence-based decisions
    #[arg(long)]
    pub no_resync: bool,

    /// Disable direction detection (every frame is logged as RX)
    #[arg(long)]
    pub no_direction: bool,

    /// Wait (ms) between reconnect attempts
    #[arg(long, value_name = "MS")]
    pub reconnect_delay: Option<u64>,

    /// TOML settings file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write diagnostics to a log file in DIR (default: the user data directory)
    #[arg(long, value_name = "DIR", num_args = 0..=1, default_missing_value = "")]
    pub diag_log: Option<PathBuf>,

    /// Keep the machine from idle-sleeping while tapping
    #[arg(long)]
    pub keep_awake: bool,

    /// List available serial ports and exit
    #[arg(long)]
    pub list: bool,

    /// With --list, print JSON
    #[arg(long, requires = "list")]
    pub json: bool,
}

impl Cli {
    /// Resolve the run settings: file first, then command-line overrides.
    pub fn to_settings(&self, now: DateTime<Local>) -> Result<TapSettings, TapError> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => TapSettings::default(),
        };

        let baud = self.baudrate.unwrap_or(DEFAULT_BAUD_RATE);
        for spec in &self.ports {
            let mut port = parse_port_spec(spec, baud)?;
            if let Some(bits) = self.bytesize {
                port.data_bits = bits;
            }
            if let Some(parity) = self.parity {
                port.parity = parity;
            }
            if let Some(stop_bits) = self.stopbits {
                port.stop_bits = stop_bits;
            }
            if self.multidrop {
                port.link = LinkKind::Multidrop;
            }
            settings.ports.push(port);
        }

        if let Some(ms) = self.packet_timeout {
            settings.frame_timeout_ms = ms;
        }
        if let Some(ms) = self.reconnect_delay {
            settings.reconnect_delay_ms = ms;
        }
        if let Some(mode) = self.mode {
            settings.detection.mode = mode;
        }
        if let Some(label) = self.initial_label {
            settings.detection.initial_label = label;
        }
        if self.no_resync {
            settings.detection.resync = false;
        }
        if self.no_direction {
            settings.detection.mode = DetectionMode::None;
        }
        if let Some(mode) = self.display_mode {
            settings.display_mode = mode;
        }
        if let Some(format) = self.log_format {
            settings.log_format = format;
        }
        if let Some(template) = &self.log_file {
            settings.log_file = Some(if template.is_empty() {
                default_log_filename(now)
            } else {
                resolve_log_path(template, now)
            });
        } else if let Some(template) = settings.log_file.take() {
            settings.log_file = Some(resolve_log_path(&template, now));
        }

        if settings.ports.is_empty() {
            return Err(TapError::NoPorts);
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Directory for the diagnostic log, when one was requested
    pub fn diag_log_dir(&self) -> Option<PathBuf> {
        let dir = self.diag_log.as_ref()?;
        if !dir.as_os_str().is_empty() {
            return Some(dir.clone());
        }
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        Some(base.join("serialtap").join("logs"))
    }
}

/// Parse `PATH[:LABEL[:BAUD]]`. The label defaults to the last path component.
pub fn parse_port_spec(spec: &str, default_baud: u32) -> Result<PortConfig, TapError> {
    let parts: Vec<&str> = spec.split(':').map(str::trim).collect();
    let device = parts[0];
    if device.is_empty() {
        return Err(TapError::Config(format!("port '{}' has no device path", spec)));
    }

    let label = match parts.get(1) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => device.rsplit(['/', '\\']).next().unwrap_or(device).to_string(),
    };

    let baud_rate = match parts.get(2) {
        Some(baud) => baud.parse::<u32>().map_err(|_| {
            TapError::Config(format!("invalid baud rate '{}' for port {}", baud, device))
        })?,
        None => default_baud,
    };

    Ok(PortConfig::new(label, device, baud_rate))
}

/// Replace `{date}`, `{time}`, `{datetime}` and `{timestamp}` in a log path.
pub fn expand_log_variables(template: &str, now: DateTime<Local>) -> String {
    template
        .replace("{date}", &now.format("%Y%m%d").to_string())
        .replace("{time}", &now.format("%H%M%S").to_string())
        .replace("{datetime}", &now.format("%Y%m%d_%H%M%S").to_string())
        .replace("{timestamp}", &now.timestamp().to_string())
}

/// Expand placeholders and make sure the name ends in `.txt`.
pub fn resolve_log_path(template: &str, now: DateTime<Local>) -> String {
    let path = expand_log_variables(template, now);
    if path.ends_with(".txt") {
        path
    } else {
        format!("{}.txt", path)
    }
}

/// `tapping_YYYYmmdd_HHMMSS.txt`
pub fn default_log_filename(now: DateTime<Local>) -> String {
    format!("{}_{}.txt", DEFAULT_LOG_PREFIX, now.format("%Y%m%d_%H%M%S"))
}
