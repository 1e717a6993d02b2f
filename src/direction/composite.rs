// src/direction/composite.rs
//
// Auto mode: pattern and size vote, and a label is only trusted when they
// agree. Agreement is fed back into the learned signatures; disagreement falls
// back to alternating. Multidrop links try bus addressing first.

use super::{AddressHeuristic, Alternating, DirectionClassifier, DirectionLabel, PatternMatch, SizeHeuristic};
use crate::io::serial::Frame;
use crate::settings::{DetectionConfig, LinkKind};

pub struct CompositeAuto {
    pattern: PatternMatch,
    size: SizeHeuristic,
    fallback: Alternating,
    use_address: bool,
    resync: bool,
}

impl CompositeAuto {
    pub fn new(config: &DetectionConfig, link: LinkKind) -> Self {
        CompositeAuto {
            pattern: PatternMatch::new(config),
            size: SizeHeuristic::new(config),
            fallback: Alternating::new(config.initial_label),
            use_address: link == LinkKind::Multidrop,
            resync: config.resync,
        }
    }

    pub fn patterns(&self) -> &PatternMatch {
        &self.pattern
    }

    fn settle(&mut self, label: DirectionLabel) -> DirectionLabel {
        if self.resync {
            self.fallback.sync(label);
        }
        label
    }
}

impl DirectionClassifier for CompositeAuto {
    fn classify(&mut self, frame: &Frame) -> DirectionLabel {
        let len = frame.len();

        if self.use_address {
            if let Some(label) = AddressHeuristic::decide(&frame.bytes) {
                self.size.observe(len);
                return self.settle(label);
            }
        }

        let signature = self.pattern.signature(&frame.bytes);
        // On a miss the pattern strategy would answer with its alternating guess
        let pattern_vote = self
            .pattern
            .lookup(&signature)
            .unwrap_or_else(|| self.fallback.peek());
        let size_vote = self.size.estimate(len);
        self.size.observe(len);

        if size_vote == Some(pattern_vote) {
            self.pattern.learn(signature, pattern_vote);
            self.settle(pattern_vote)
        } else {
            self.fallback.next()
        }
    }

    fn name(&self) -> &'static str {
        "auto"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::frame;
    use super::*;
    use crate::checksums::append_modbus_crc;

    fn warmed_up() -> CompositeAuto {
        let mut auto = CompositeAuto::new(&DetectionConfig::default(), LinkKind::Generic);
        // Three frames alternate while size warms up; the fourth has both votes on RX
        for (i, expected) in [DirectionLabel::Tx, DirectionLabel::Rx, DirectionLabel::Tx, DirectionLabel::Rx]
            .into_iter()
            .enumerate()
        {
            let mut reply = vec![0x55u8; 20];
            reply[0] = i as u8;
            assert_eq!(auto.classify(&frame(&reply)), expected);
        }
        auto
    }

    #[test]
    fn test_agreement_returns_label_and_learns_signature() {
        let mut auto = warmed_up();
        // Unseen short frame: pattern vote is the alternating guess (TX), size
        // vote is TX (4 < 20)
        let query: [u8; 4] = [0xA1, 0xA2, 0xA3, 0xA4];
        assert_eq!(auto.classify(&frame(&query)), DirectionLabel::Tx);
        assert!(auto.patterns().knows(DirectionLabel::Tx, &query));
    }

    #[test]
    fn test_disagreement_falls_back_to_alternating() {
        let mut auto = warmed_up();
        let query: [u8; 4] = [0xA1, 0xA2, 0xA3, 0xA4];
        assert_eq!(auto.classify(&frame(&query)), DirectionLabel::Tx);

        // Same signature (learned TX) but a long frame: size says RX
        let mut long = vec![0xA1, 0xA2, 0xA3, 0xA4];
        long.extend_from_slice(&[0u8; 60]);
        assert_eq!(auto.classify(&frame(&long)), DirectionLabel::Rx);
        // The learned label is not overwritten by a disagreement
        assert!(auto.patterns().knows(DirectionLabel::Tx, &query));
    }

    #[test]
    fn test_multidrop_consults_address_first() {
        let mut auto = CompositeAuto::new(&DetectionConfig::default(), LinkKind::Multidrop);
        let reply = append_modbus_crc(&[0x11, 0x03, 0x04, 0x02, 0x2B, 0x00, 0x64]);
        // Alternating alone would say TX for the first frame
        assert_eq!(auto.classify(&frame(&reply)), DirectionLabel::Rx);

        let request = append_modbus_crc(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x02]);
        assert_eq!(auto.classify(&frame(&request)), DirectionLabel::Tx);
    }

    #[test]
    fn test_generic_link_ignores_addressing() {
        let mut auto = CompositeAuto::new(&DetectionConfig::default(), LinkKind::Generic);
        let reply = append_modbus_crc(&[0x11, 0x03, 0x04, 0x02, 0x2B, 0x00, 0x64]);
        assert_eq!(auto.classify(&frame(&reply)), DirectionLabel::Tx);
    }
}
