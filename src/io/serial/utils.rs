// src/io/serial/utils.rs
//
// Shared utilities for serial port readers.
// Provides common types and conversion functions for the serialport crate.

use serde::{Deserialize, Serialize};

// The serialport conversions only build where the crate is available
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
use {
    crate::error::LinkError,
    crate::settings::StopBits,
    serialport::{DataBits, Parity as SpParity, StopBits as SpStopBits},
};

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

impl Parity {
    /// Single-letter form used in `8N1` summaries and on the command line
    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

impl std::str::FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "n" | "none" => Ok(Parity::None),
            "o" | "odd" => Ok(Parity::Odd),
            "e" | "even" => Ok(Parity::Even),
            "m" | "mark" => Ok(Parity::Mark),
            "s" | "space" => Ok(Parity::Space),
            _ => Err(format!("Unknown parity: {}", s)),
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type.
/// Mark and space parity have no portable serialport setting.
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub fn to_serialport_parity(p: &Parity) -> Result<SpParity, LinkError> {
    match p {
        Parity::None => Ok(SpParity::None),
        Parity::Odd => Ok(SpParity::Odd),
        Parity::Even => Ok(SpParity::Even),
        Parity::Mark | Parity::Space => Err(LinkError::Misconfigured(format!(
            "{:?} parity is not supported by this platform driver",
            p
        ))),
    }
}

/// Convert data bits count to serialport crate's DataBits type
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub fn to_serialport_data_bits(bits: u8) -> Result<DataBits, LinkError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(LinkError::Misconfigured(format!("invalid data bits: {}", bits))),
    }
}

/// Convert our stop bits to serialport crate's StopBits type
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub fn to_serialport_stop_bits(bits: StopBits) -> SpStopBits {
    match bits {
        StopBits::One => SpStopBits::One,
        StopBits::OnePointFive | StopBits::Two => SpStopBits::Two,
    }
}

// ============================================================================
// Tests
// ============================================================================
