// src/direction/size.rs
//
// Commands are usually shorter than the replies they trigger: a frame shorter
// than the recent average is guessed TX, anything else RX.

use std::collections::VecDeque;

use super::{Alternating, DirectionClassifier, DirectionLabel};
use crate::io::serial::Frame;
use crate::settings::DetectionConfig;

pub struct SizeHeuristic {
    window: VecDeque<usize>,
    capacity: usize,
    min_samples: usize,
    fallback: Alternating,
    resync: bool,
}

impl SizeHeuristic {
    pub fn new(config: &DetectionConfig) -> Self {
        let capacity = config.size_window.max(1);
        SizeHeuristic {
            window: VecDeque::with_capacity(capacity),
            capacity,
            min_samples: config.size_min_samples.clamp(1, capacity),
            fallback: Alternating::new(config.initial_label),
            resync: config.resync,
        }
    }

    /// Label for a frame of `len` bytes, or `None` while the window is too
    /// small to trust its average.
    pub fn estimate(&self, len: usize) -> Option<DirectionLabel> {
        if self.window.len() < self.min_samples {
            return None;
        }
        let total: usize = self.window.iter().sum();
        let average = total as f64 / self.window.len() as f64;
        if (len as f64) < average {
            Some(DirectionLabel::Tx)
        } else {
            Some(DirectionLabel::Rx)
        }
    }

    /// Push a length into the rolling window
    pub fn observe(&mut self, len: usize) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(len);
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }
}

impl DirectionClassifier for SizeHeuristic {
    fn classify(&mut self, frame: &Frame) -> DirectionLabel {
        let label = match self.estimate(frame.len()) {
            Some(label) => {
                if self.resync {
                    self.fallback.sync(label);
                }
                label
            }
            None => self.fallback.next(),
        };
        self.observe(frame.len());
        label
    }

    fn name(&self) -> &'static str {
        "size"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::frame;
    use super::*;

    #[test]
    fn test_warm_up_uses_alternating() {
        let mut size = SizeHeuristic::new(&DetectionConfig::default());
        // min_samples = 3: the first three frames alternate regardless of size
        assert_eq!(size.classify(&frame(&[0; 100])), DirectionLabel::Tx);
        assert_eq!(size.classify(&frame(&[0; 1])), DirectionLabel::Rx);
        assert_eq!(size.classify(&frame(&[0; 100])), DirectionLabel::Tx);
        assert_eq!(size.samples(), 3);
    }

    #[test]
    fn test_short_frames_are_tx_long_are_rx() {
        let mut size = SizeHeuristic::new(&DetectionConfig::default());
        for len in [8, 25, 8, 25] {
            size.classify(&frame(&vec![0; len]));
        }
        // Average 16.5
        assert_eq!(size.classify(&frame(&[0; 8])), DirectionLabel::Tx);
        assert_eq!(size.classify(&frame(&[0; 25])), DirectionLabel::Rx);
    }

    #[test]
    fn test_equal_to_average_is_rx() {
        let mut size = SizeHeuristic::new(&DetectionConfig::default());
        for _ in 0..3 {
            size.observe(10);
        }
        assert_eq!(size.estimate(10), Some(DirectionLabel::Rx));
        assert_eq!(size.estimate(9), Some(DirectionLabel::Tx));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut size = SizeHeuristic::new(&DetectionConfig {
            size_window: 5,
            ..Default::default()
        });
        for _ in 0..5 {
            size.observe(100);
        }
        for _ in 0..5 {
            size.observe(2);
        }
        assert_eq!(size.samples(), 5);
        // Old 100-byte frames have rolled out; average is 2
        assert_eq!(size.estimate(2), Some(DirectionLabel::Rx));
        assert_eq!(size.estimate(1), Some(DirectionLabel::Tx));
    }
}
