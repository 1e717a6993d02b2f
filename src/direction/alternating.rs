// src/direction/alternating.rs
//
// Request/response lines mostly alternate: TX, RX, TX, RX.
// Also the fallback used by every other strategy when it has no evidence.

use super::{DirectionClassifier, DirectionLabel};
use crate::io::serial::Frame;

#[derive(Debug, Clone)]
pub struct Alternating {
    initial: DirectionLabel,
    last: Option<DirectionLabel>,
}

impl Alternating {
    pub fn new(initial: DirectionLabel) -> Self {
        Alternating {
            initial,
            last: None,
        }
    }

    /// The label `next` would return, without advancing
    pub fn peek(&self) -> DirectionLabel {
        match self.last {
            None => self.initial,
            Some(last) => last.toggled(),
        }
    }

    pub fn next(&mut self) -> DirectionLabel {
        let label = self.peek();
        self.last = Some(label);
        label
    }

    /// Treat `label` as the most recent output so the next call toggles from it.
    pub fn sync(&mut self, label: DirectionLabel) {
        if label != DirectionLabel::Unknown {
            self.last = Some(label);
        }
    }
}

impl DirectionClassifier for Alternating {
    fn classify(&mut self, _frame: &Frame) -> DirectionLabel {
        self.next()
    }

    fn name(&self) -> &'static str {
        "alternating"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::frame;
    use super::*;

    #[test]
    fn test_first_label_is_initial_then_alternates() {
        for initial in [DirectionLabel::Tx, DirectionLabel::Rx] {
            let mut alt = Alternating::new(initial);
            let labels: Vec<_> = (0..6).map(|_| alt.classify(&frame(b"x"))).collect();
            assert_eq!(labels[0], initial);
            for pair in labels.windows(2) {
                assert_ne!(pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut alt = Alternating::new(DirectionLabel::Tx);
        assert_eq!(alt.peek(), DirectionLabel::Tx);
        assert_eq!(alt.peek(), DirectionLabel::Tx);
        assert_eq!(alt.next(), DirectionLabel::Tx);
        assert_eq!(alt.peek(), DirectionLabel::Rx);
    }

    #[test]
    fn test_sync_realigns() {
        let mut alt = Alternating::new(DirectionLabel::Tx);
        alt.sync(DirectionLabel::Tx);
        assert_eq!(alt.next(), DirectionLabel::Rx);

        // Unknown carries no phase information
        alt.sync(DirectionLabel::Unknown);
        assert_eq!(alt.next(), DirectionLabel::Tx);
    }
}
