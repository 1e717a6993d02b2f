// src/session.rs
//
// Per-port session: link state, frame assembler and direction classifier for
// one tapped port. Owned by that port's reader thread; nothing else touches it.

use std::fmt;
use std::time::Instant;

use crate::direction::{build_classifier, effective_mode, DirectionClassifier};
use crate::event::Event;
use crate::io::serial::{Frame, FrameAssembler};
use crate::settings::{DetectionConfig, PayloadFormat, PortConfig};

/// Link lifecycle of one port.
///
/// `Disconnected → Connecting → Connected → (Error → Reconnecting → Connecting)* → Disconnected`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
}

impl LinkState {
    /// Whether `next` is a legal successor of this state
    pub fn can_become(self, next: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Error)
                | (Error, Reconnecting)
                | (Reconnecting, Connecting)
                | (_, Disconnected)
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Error => "error",
            LinkState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

pub struct PortSession {
    label: String,
    state: LinkState,
    assembler: FrameAssembler,
    classifier: Box<dyn DirectionClassifier>,
    format: PayloadFormat,
}

impl PortSession {
    pub fn new(
        config: &PortConfig,
        frame_timeout: std::time::Duration,
        detection: &DetectionConfig,
        format: PayloadFormat,
    ) -> Self {
        let mode = effective_mode(detection.mode, config.link);
        if mode != detection.mode {
            tlog!(
                "[Serial:{}] {:?} detection needs a multidrop link, using {:?} instead",
                config.label,
                detection.mode,
                mode
            );
        }
        PortSession {
            label: config.label.clone(),
            state: LinkState::Disconnected,
            assembler: FrameAssembler::new(config.label.clone(), frame_timeout),
            classifier: build_classifier(detection, config.link),
            format,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Name of the direction strategy in use
    pub fn strategy(&self) -> &'static str {
        self.classifier.name()
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn transition(&mut self, next: LinkState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_become(next) {
            tlog!(
                "[Session:{}] Ignoring illegal transition {} -> {}",
                self.label,
                self.state,
                next
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Feed bytes read at `at`. Returns an event when they closed a frame.
    pub fn ingest(&mut self, bytes: &[u8], at: Instant) -> Option<Event> {
        let frame = self.assembler.push(bytes, at)?;
        Some(self.finish(frame))
    }

    /// Close the pending frame if the line has been quiet long enough.
    pub fn poll_idle(&mut self, now: Instant) -> Option<Event> {
        let frame = self.assembler.poll_idle(now)?;
        Some(self.finish(frame))
    }

    /// Close the pending frame unconditionally (stop or link loss).
    pub fn flush(&mut self) -> Option<Event> {
        let frame = self.assembler.flush()?;
        Some(self.finish(frame))
    }

    fn finish(&mut self, frame: Frame) -> Event {
        let direction = self.classifier.classify(&frame);
        Event::frame(frame, direction, self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::DirectionLabel;
    use crate::settings::DetectionMode;
    use std::time::Duration;

    fn session() -> PortSession {
        PortSession::new(
            &PortConfig::new("DeviceA", "/dev/ttyUSB0", 9600),
            Duration::from_millis(50),
            &DetectionConfig::default(),
            PayloadFormat::Hex,
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut s = session();
        assert_eq!(s.state(), LinkState::Disconnected);
        assert!(s.transition(LinkState::Connecting));
        assert!(s.transition(LinkState::Connected));
        assert!(s.transition(LinkState::Error));
        assert!(s.transition(LinkState::Reconnecting));
        assert!(s.transition(LinkState::Connecting));
        assert!(s.transition(LinkState::Disconnected));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut s = session();
        assert!(!s.transition(LinkState::Connected));
        assert_eq!(s.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_frames_are_classified_in_order() {
        let mut s = session();
        let t0 = Instant::now();
        assert!(s.ingest(b"Q", t0).is_none());
        let first = s.ingest(b"R", t0 + Duration::from_millis(80)).unwrap();
        assert_eq!(first.direction(), DirectionLabel::Tx);
        assert!(first.record().ends_with(" 51"));

        let second = s.poll_idle(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(second.direction(), DirectionLabel::Rx);
        assert!(s.flush().is_none());
    }

    #[test]
    fn test_flush_emits_partial_frame() {
        let mut s = session();
        s.ingest(b"AB", Instant::now());
        let event = s.flush().unwrap();
        assert!(event.record().ends_with(" 41 42"));
    }

    #[test]
    fn test_strategy_follows_detection_mode() {
        let s = PortSession::new(
            &PortConfig::new("DeviceA", "/dev/ttyUSB0", 9600),
            Duration::from_millis(50),
            &DetectionConfig {
                mode: DetectionMode::Timing,
                ..Default::default()
            },
            PayloadFormat::Hex,
        );
        assert_eq!(s.strategy(), "timing");
    }
}
