// src/direction/pattern.rs
//
// Learned signatures: the leading bytes of a frame tend to repeat for the same
// command (or the same reply), so once a signature has been labelled the label
// sticks. Unseen signatures take the alternating guess and are remembered.

use std::collections::{HashSet, VecDeque};

use super::{Alternating, DirectionClassifier, DirectionLabel};
use crate::io::serial::Frame;
use crate::settings::DetectionConfig;

// ============================================================================
// Signature Set
// ============================================================================

/// Insertion-ordered set with a fixed capacity; the oldest entry is evicted
/// when a new one would overflow it.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    capacity: usize,
    order: VecDeque<Vec<u8>>,
    members: HashSet<Vec<u8>>,
}

impl SignatureSet {
    pub fn new(capacity: usize) -> Self {
        SignatureSet {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    pub fn contains(&self, signature: &[u8]) -> bool {
        self.members.contains(signature)
    }

    /// Returns false when the signature was already present.
    pub fn insert(&mut self, signature: Vec<u8>) -> bool {
        if self.members.contains(&signature) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(signature.clone());
        self.order.push_back(signature);
        true
    }

    pub fn remove(&mut self, signature: &[u8]) -> bool {
        if !self.members.remove(signature) {
            return false;
        }
        self.order.retain(|s| s.as_slice() != signature);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================================
// Pattern Match Classifier
// ============================================================================

pub struct PatternMatch {
    signature_len: usize,
    tx: SignatureSet,
    rx: SignatureSet,
    fallback: Alternating,
    resync: bool,
}

impl PatternMatch {
    pub fn new(config: &DetectionConfig) -> Self {
        PatternMatch {
            signature_len: config.signature_len.max(1),
            tx: SignatureSet::new(config.pattern_capacity),
            rx: SignatureSet::new(config.pattern_capacity),
            fallback: Alternating::new(config.initial_label),
            resync: config.resync,
        }
    }

    pub fn signature(&self, bytes: &[u8]) -> Vec<u8> {
        bytes[..bytes.len().min(self.signature_len)].to_vec()
    }

    pub fn lookup(&self, signature: &[u8]) -> Option<DirectionLabel> {
        if self.tx.contains(signature) {
            Some(DirectionLabel::Tx)
        } else if self.rx.contains(signature) {
            Some(DirectionLabel::Rx)
        } else {
            None
        }
    }

    /// Record `signature` under `label`. A signature lives in one set only.
    pub fn learn(&mut self, signature: Vec<u8>, label: DirectionLabel) {
        match label {
            DirectionLabel::Tx => {
                self.rx.remove(&signature);
                self.tx.insert(signature);
            }
            DirectionLabel::Rx => {
                self.tx.remove(&signature);
                self.rx.insert(signature);
            }
            DirectionLabel::Unknown => {}
        }
    }

    pub fn knows(&self, label: DirectionLabel, signature: &[u8]) -> bool {
        match label {
            DirectionLabel::Tx => self.tx.contains(signature),
            DirectionLabel::Rx => self.rx.contains(signature),
            DirectionLabel::Unknown => false,
        }
    }

    pub fn learned(&self) -> (usize, usize) {
        (self.tx.len(), self.rx.len())
    }
}

impl DirectionClassifier for PatternMatch {
    fn classify(&mut self, frame: &Frame) -> DirectionLabel {
        let signature = self.signature(&frame.bytes);
        match self.lookup(&signature) {
            Some(label) => {
                if self.resync {
                    self.fallback.sync(label);
                }
                label
            }
            None => {
                let label = self.fallback.next();
                self.learn(signature, label);
                label
            }
        }
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}
