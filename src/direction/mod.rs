// src/direction/mod.rs
//
// Direction inference for tapped frames.
// A tap sees both halves of a conversation on one line and cannot tell who
// sent what, so each strategy here guesses TX/RX from what it has seen so far
// on that port. One classifier instance is built per port, once per run.

mod address;
mod alternating;
mod composite;
mod pattern;
mod size;
mod timing;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::io::serial::Frame;
use crate::settings::{DetectionConfig, DetectionMode, LinkKind};

pub use address::AddressHeuristic;
pub use alternating::Alternating;
pub use composite::CompositeAuto;
pub use pattern::{PatternMatch, SignatureSet};
pub use size::SizeHeuristic;
pub use timing::TimingGap;

// ============================================================================
// Types
// ============================================================================

/// Inferred direction of a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionLabel {
    Tx,
    Rx,
    Unknown,
}

impl DirectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectionLabel::Tx => "TX",
            DirectionLabel::Rx => "RX",
            DirectionLabel::Unknown => "UNKNOWN",
        }
    }

    /// TX <-> RX. Unknown has no opposite.
    pub fn toggled(&self) -> DirectionLabel {
        match self {
            DirectionLabel::Tx => DirectionLabel::Rx,
            DirectionLabel::Rx => DirectionLabel::Tx,
            DirectionLabel::Unknown => DirectionLabel::Unknown,
        }
    }

    /// Arrow used by the console display
    pub fn arrow(&self) -> &'static str {
        match self {
            DirectionLabel::Tx => "→",
            DirectionLabel::Rx => "←",
            DirectionLabel::Unknown => "?",
        }
    }
}

impl fmt::Display for DirectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DirectionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tx" => Ok(DirectionLabel::Tx),
            "rx" => Ok(DirectionLabel::Rx),
            _ => Err(format!("Unknown direction: {} (expected tx or rx)", s)),
        }
    }
}

// ============================================================================
// Classifier Trait
// ============================================================================

/// Per-port direction strategy. Implementations keep whatever history they
/// need; `classify` both decides and records the frame.
pub trait DirectionClassifier: Send {
    fn classify(&mut self, frame: &Frame) -> DirectionLabel;

    /// Short strategy name for log lines
    fn name(&self) -> &'static str;
}

/// Passive logging: every frame is recorded as RX.
pub struct NoDetection;

impl DirectionClassifier for NoDetection {
    fn classify(&mut self, _frame: &Frame) -> DirectionLabel {
        DirectionLabel::Rx
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Strategy that actually runs for `mode` on a `link`.
///
/// `Address` on a generic link has no bus addressing to read, so it degrades to
/// alternating.
pub fn effective_mode(mode: DetectionMode, link: LinkKind) -> DetectionMode {
    match (mode, link) {
        (DetectionMode::Address, LinkKind::Generic) => DetectionMode::Alternating,
        _ => mode,
    }
}

/// Build the classifier for one port. `Auto` only consults addresses on
/// multidrop links.
pub fn build_classifier(config: &DetectionConfig, link: LinkKind) -> Box<dyn DirectionClassifier> {
    match effective_mode(config.mode, link) {
        DetectionMode::Alternating => Box::new(Alternating::new(config.initial_label)),
        DetectionMode::Pattern => Box::new(PatternMatch::new(config)),
        DetectionMode::Size => Box::new(SizeHeuristic::new(config)),
        DetectionMode::Timing => Box::new(TimingGap::new(config)),
        DetectionMode::Address => Box::new(AddressHeuristic::new(config)),
        DetectionMode::Auto => Box::new(CompositeAuto::new(config, link)),
        DetectionMode::None => Box::new(NoDetection),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Local;
    use std::time::{Duration, Instant};

    use crate::io::serial::Frame;

    pub fn frame(bytes: &[u8]) -> Frame {
        let now = Instant::now();
        frame_at(bytes, now, now)
    }

    pub fn frame_at(bytes: &[u8], first: Instant, last: Instant) -> Frame {
        Frame {
            port: "test".to_string(),
            bytes: bytes.to_vec(),
            first_arrival: first,
            last_arrival: last,
            timestamp: Local::now(),
            incomplete: false,
        }
    }

    pub fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }
}
