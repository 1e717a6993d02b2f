// src/direction/address.rs
//
// Multidrop (RS-485) heuristic tuned for Modbus RTU framing:
// [address, function, ..., crc_lo, crc_hi].
//
// Requests and replies share function codes, so the code alone only tells us
// which length rule applies:
// - reads (0x01-0x04): request is exactly 8 bytes, reply is 5 + byte_count
// - multi-writes (0x0F, 0x10): reply is exactly 8 bytes, request is 9 + byte_count
// - high bit set on the function code: exception reply

use super::{Alternating, DirectionClassifier, DirectionLabel};
use crate::checksums::modbus_crc_valid;
use crate::io::serial::Frame;
use crate::settings::DetectionConfig;

/// Highest unicast slave address
const MAX_ADDRESS: u8 = 247;

/// Function codes whose request is a fixed 8-byte query
const READ_FUNCTIONS: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

/// Function codes whose reply is a fixed 8-byte echo of address/quantity
const WRITE_MULTIPLE_FUNCTIONS: [u8; 2] = [0x0F, 0x10];

const EXCEPTION_BIT: u8 = 0x80;

pub struct AddressHeuristic {
    fallback: Alternating,
    resync: bool,
}

impl AddressHeuristic {
    pub fn new(config: &DetectionConfig) -> Self {
        AddressHeuristic {
            fallback: Alternating::new(config.initial_label),
            resync: config.resync,
        }
    }

    /// Direction from bus addressing alone, or `None` when the frame does not
    /// look like a well-formed addressed frame we have a rule for.
    pub fn decide(bytes: &[u8]) -> Option<DirectionLabel> {
        if bytes.len() < 4 || !modbus_crc_valid(bytes) {
            return None;
        }

        let address = bytes[0];
        let function = bytes[1];
        if address > MAX_ADDRESS {
            return None;
        }

        if function & EXCEPTION_BIT != 0 {
            return Some(DirectionLabel::Rx);
        }

        let len = bytes.len();
        let (is_request, is_reply) = if READ_FUNCTIONS.contains(&function) {
            (len == 8, usize::from(bytes[2]) + 5 == len)
        } else if WRITE_MULTIPLE_FUNCTIONS.contains(&function) {
            (len >= 7 && usize::from(bytes[6]) + 9 == len, len == 8)
        } else {
            return None;
        };

        match (is_request, is_reply) {
            (true, false) => Some(DirectionLabel::Tx),
            (false, true) => Some(DirectionLabel::Rx),
            _ => None,
        }
    }

    fn note(&mut self, label: DirectionLabel) {
        if self.resync {
            self.fallback.sync(label);
        }
    }
}

impl DirectionClassifier for AddressHeuristic {
    fn classify(&mut self, frame: &Frame) -> DirectionLabel {
        match Self::decide(&frame.bytes) {
            Some(label) => {
                self.note(label);
                label
            }
            None => self.fallback.next(),
        }
    }

    fn name(&self) -> &'static str {
        "address"
    }
}
