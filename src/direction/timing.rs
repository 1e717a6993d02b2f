// src/direction/timing.rs
//
// A reply follows its command closely; a frame after a long silence is a
// fresh command.

use std::time::{Duration, Instant};

use super::{DirectionClassifier, DirectionLabel};
use crate::io::serial::Frame;
use crate::settings::DetectionConfig;

pub struct TimingGap {
    threshold: Duration,
    initial: DirectionLabel,
    previous_end: Option<Instant>,
}

impl TimingGap {
    pub fn new(config: &DetectionConfig) -> Self {
        TimingGap {
            threshold: config.gap_threshold(),
            initial: config.initial_label,
            previous_end: None,
        }
    }
}

impl DirectionClassifier for TimingGap {
    fn classify(&mut self, frame: &Frame) -> DirectionLabel {
        let label = match self.previous_end {
            None => self.initial,
            Some(end) => {
                if frame.first_arrival.saturating_duration_since(end) > self.threshold {
                    DirectionLabel::Tx
                } else {
                    DirectionLabel::Rx
                }
            }
        };
        self.previous_end = Some(frame.last_arrival);
        label
    }

    fn name(&self) -> &'static str {
        "timing"
    }
}
