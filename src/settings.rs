// src/settings.rs
//
// Run configuration: per-port settings plus the run-wide timing, queue and
// detection parameters. Every field has a serde default so a settings file
// only needs to mention what it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::direction::DirectionLabel;
use crate::error::TapError;
use crate::io::serial::Parity;

// ============================================================================
// Port Configuration
// ============================================================================

/// Stop bits setting. Serialport only drives 1 and 2; 1.5 is accepted and
/// opened as 2 (the usual UART behaviour for 5-bit words).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl Default for StopBits {
    fn default() -> Self {
        StopBits::One
    }
}

impl std::str::FromStr for StopBits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            _ => Err(format!("Unknown stop bits: {} (expected 1, 1.5 or 2)", s)),
        }
    }
}

/// Physical topology of the link, used to pick direction heuristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Point-to-point line
    Generic,
    /// Shared addressed bus (RS-485 style)
    Multidrop,
}

impl Default for LinkKind {
    fn default() -> Self {
        LinkKind::Generic
    }
}

/// One tapped port. Immutable once its reader starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Display label, used as the port identifier in events and statistics
    pub label: String,
    /// Device path (e.g. /dev/ttyUSB0, COM3)
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub link: LinkKind,
}

impl PortConfig {
    pub fn new(label: impl Into<String>, device: impl Into<String>, baud_rate: u32) -> Self {
        PortConfig {
            label: label.into(),
            device: device.into(),
            baud_rate,
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: StopBits::One,
            link: LinkKind::Generic,
        }
    }

    /// `8N1`-style summary for log lines
    pub fn line_settings(&self) -> String {
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        format!("{}{}{}", self.data_bits, self.parity.letter(), stop)
    }

    pub fn validate(&self) -> Result<(), TapError> {
        if self.label.trim().is_empty() {
            return Err(TapError::Config(format!("port on '{}' has an empty label", self.device)));
        }
        if self.device.trim().is_empty() {
            return Err(TapError::Config(format!("port '{}' has no device path", self.label)));
        }
        if self.baud_rate == 0 {
            return Err(TapError::Config(format!("port '{}' has a zero baud rate", self.label)));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(TapError::Config(format!(
                "port '{}' has invalid data bits {} (expected 5-8)",
                self.label, self.data_bits
            )));
        }
        Ok(())
    }
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}

// ============================================================================
// Detection Configuration
// ============================================================================

/// Direction inference strategy, selected once per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Alternating,
    Pattern,
    Size,
    Timing,
    Address,
    Auto,
    None,
}

impl Default for DetectionMode {
    fn default() -> Self {
        DetectionMode::Alternating
    }
}

impl std::str::FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alternating" | "alt" => Ok(DetectionMode::Alternating),
            "pattern" => Ok(DetectionMode::Pattern),
            "size" => Ok(DetectionMode::Size),
            "timing" | "gap" => Ok(DetectionMode::Timing),
            "address" | "modbus" => Ok(DetectionMode::Address),
            "auto" => Ok(DetectionMode::Auto),
            "none" | "off" => Ok(DetectionMode::None),
            _ => Err(format!("Unknown detection mode: {}", s)),
        }
    }
}

/// Parameters for the direction classifiers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub mode: DetectionMode,
    /// Label given to a port's first frame by alternating fallbacks
    #[serde(default = "default_initial_label")]
    pub initial_label: DirectionLabel,
    /// Re-align the alternating fallback with evidence-based decisions
    #[serde(default = "default_resync")]
    pub resync: bool,
    /// Leading bytes used as a frame signature
    #[serde(default = "default_signature_len")]
    pub signature_len: usize,
    /// Max signatures remembered per direction per port
    #[serde(default = "default_pattern_capacity")]
    pub pattern_capacity: usize,
    /// Rolling window of frame lengths
    #[serde(default = "default_size_window")]
    pub size_window: usize,
    /// Lengths required before the rolling average is trusted
    #[serde(default = "default_size_min_samples")]
    pub size_min_samples: usize,
    /// Silence before a frame that marks it as a fresh command
    #[serde(default = "default_gap_threshold_ms")]
    pub gap_threshold_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            mode: DetectionMode::default(),
            initial_label: default_initial_label(),
            resync: default_resync(),
            signature_len: default_signature_len(),
            pattern_capacity: default_pattern_capacity(),
            size_window: default_size_window(),
            size_min_samples: default_size_min_samples(),
            gap_threshold_ms: default_gap_threshold_ms(),
        }
    }
}

impl DetectionConfig {
    pub fn gap_threshold(&self) -> Duration {
        Duration::from_millis(self.gap_threshold_ms)
    }
}

fn default_initial_label() -> DirectionLabel {
    DirectionLabel::Tx
}
fn default_resync() -> bool {
    true
}
fn default_signature_len() -> usize {
    4
}
fn default_pattern_capacity() -> usize {
    256
}
fn default_size_window() -> usize {
    20
}
fn default_size_min_samples() -> usize {
    3
}
fn default_gap_threshold_ms() -> u64 {
    100
}

// ============================================================================
// Output Configuration
// ============================================================================

/// Payload text encoding for the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Hex,
    Ascii,
}

impl Default for PayloadFormat {
    fn default() -> Self {
        PayloadFormat::Hex
    }
}

impl std::str::FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hex" => Ok(PayloadFormat::Hex),
            "ascii" => Ok(PayloadFormat::Ascii),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// What the live console display shows for each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Hex,
    Ascii,
    Both,
}

impl Default for DisplayMode {
    fn default() -> Self {
        DisplayMode::Both
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hex" => Ok(DisplayMode::Hex),
            "ascii" => Ok(DisplayMode::Ascii),
            "both" => Ok(DisplayMode::Both),
            _ => Err(format!("Unknown display mode: {}", s)),
        }
    }
}

// ============================================================================
// Tap Settings
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TapSettings {
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    /// Inter-arrival gap that ends a frame
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    /// Sleep between empty polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Max wait for queue space before an event is dropped
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// Per-reader join bound at shutdown
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Bound on the writer's final drain
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub log_format: PayloadFormat,
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Capture file; `None` means display only
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for TapSettings {
    fn default() -> Self {
        TapSettings {
            ports: Vec::new(),
            frame_timeout_ms: default_frame_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            detection: DetectionConfig::default(),
            log_format: PayloadFormat::default(),
            display_mode: DisplayMode::default(),
            log_file: None,
        }
    }
}

fn default_frame_timeout_ms() -> u64 {
    50
}
fn default_poll_interval_ms() -> u64 {
    1
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_queue_capacity() -> usize {
    20_000
}
fn default_enqueue_timeout_ms() -> u64 {
    200
}
fn default_join_timeout_ms() -> u64 {
    1000
}
fn default_drain_timeout_ms() -> u64 {
    5000
}

impl TapSettings {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), TapError> {
        if self.frame_timeout_ms == 0 {
            return Err(TapError::Config("frame_timeout_ms must be > 0".to_string()));
        }
        // A zero poll interval turns every idle reader into a busy loop
        if self.poll_interval_ms == 0 {
            return Err(TapError::Config("poll_interval_ms must be > 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(TapError::Config("queue_capacity must be > 0".to_string()));
        }
        if self.detection.signature_len == 0 || self.detection.pattern_capacity == 0 {
            return Err(TapError::Config(
                "signature_len and pattern_capacity must be > 0".to_string(),
            ));
        }
        if self.detection.size_window == 0 {
            return Err(TapError::Config("size_window must be > 0".to_string()));
        }
        let mut labels = std::collections::HashSet::new();
        for port in &self.ports {
            port.validate()?;
            if !labels.insert(port.label.as_str()) {
                return Err(TapError::Config(format!("duplicate port label '{}'", port.label)));
            }
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<TapSettings, TapError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TapError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_settings(&content)
}

/// Parse settings from TOML text.
pub fn parse_settings(content: &str) -> Result<TapSettings, TapError> {
    let settings: TapSettings = toml::from_str(content)
        .map_err(|e| TapError::Config(format!("Failed to parse TOML: {}", e)))?;
    settings.validate()?;
    Ok(settings)
}
