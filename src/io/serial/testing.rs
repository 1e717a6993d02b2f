// src/io/serial/testing.rs
//
// Scripted links for exercising readers and the supervisor without hardware.
// A `ScriptedLink` replays data and failures at fixed offsets from the moment
// it is first polled; a `ScriptedOpener` hands out a queue of open outcomes and
// records when each attempt was made.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::link::{LinkOpener, SerialLink};
use crate::error::LinkError;
use crate::settings::PortConfig;

/// One scripted event on a link, relative to its first poll
#[derive(Debug, Clone)]
pub enum LinkStep {
    Data { after: Duration, bytes: Vec<u8> },
    Fail { after: Duration, error: LinkError },
}

impl LinkStep {
    fn due(&self) -> Duration {
        match self {
            LinkStep::Data { after, .. } | LinkStep::Fail { after, .. } => *after,
        }
    }
}

/// A link that replays its steps in order, then stays silent.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    steps: VecDeque<LinkStep>,
    pending: Vec<u8>,
    started: Option<Instant>,
    empty_reads: usize,
    hold: Option<Duration>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `bytes` once `after` has elapsed
    pub fn data(mut self, after_ms: u64, bytes: &[u8]) -> Self {
        self.steps.push_back(LinkStep::Data {
            after: Duration::from_millis(after_ms),
            bytes: bytes.to_vec(),
        });
        self
    }

    /// Fail the next poll once `after` has elapsed
    pub fn fail(mut self, after_ms: u64, error: LinkError) -> Self {
        self.steps.push_back(LinkStep::Fail {
            after: Duration::from_millis(after_ms),
            error,
        });
        self
    }

    /// Make the next `count` reads return nothing even with bytes waiting,
    /// like a driver read that times out before the data is handed over
    pub fn empty_reads(mut self, count: usize) -> Self {
        self.empty_reads = count;
        self
    }

    /// Block the first poll for `ms`, ignoring any stop request, like a
    /// driver call that hangs
    pub fn hang(mut self, ms: u64) -> Self {
        self.hold = Some(Duration::from_millis(ms));
        self
    }

    fn elapsed(&mut self) -> Duration {
        self.started.get_or_insert_with(Instant::now).elapsed()
    }
}

impl SerialLink for ScriptedLink {
    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        if let Some(hold) = self.hold.take() {
            std::thread::sleep(hold);
        }
        let elapsed = self.elapsed();
        while self.steps.front().map_or(false, |step| step.due() <= elapsed) {
            // Buffered bytes are delivered before a failure surfaces
            if matches!(self.steps.front(), Some(LinkStep::Fail { .. })) && !self.pending.is_empty() {
                break;
            }
            match self.steps.pop_front() {
                Some(LinkStep::Data { bytes, .. }) => self.pending.extend_from_slice(&bytes),
                Some(LinkStep::Fail { error, .. }) => return Err(error),
                None => break,
            }
        }
        Ok(self.pending.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.empty_reads > 0 && !self.pending.is_empty() {
            self.empty_reads -= 1;
            return Ok(0);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    /// Steps already due when the link is cleared are discarded, like bytes
    /// that were sitting in a real port's buffer before the tap attached.
    fn clear_input(&mut self) -> Result<(), LinkError> {
        let elapsed = self.elapsed();
        while let Some(LinkStep::Data { after, .. }) = self.steps.front() {
            if *after > elapsed {
                break;
            }
            self.steps.pop_front();
        }
        self.pending.clear();
        Ok(())
    }
}

/// Outcome of one open attempt
pub enum OpenOutcome {
    Fail(LinkError),
    Link(ScriptedLink),
}

/// Hands out scripted outcomes in order. Once the script runs out every
/// further attempt fails as unavailable.
#[derive(Default)]
pub struct ScriptedOpener {
    script: Mutex<VecDeque<OpenOutcome>>,
    attempts: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedOpener {
    pub fn new(outcomes: impl IntoIterator<Item = OpenOutcome>) -> Self {
        ScriptedOpener {
            script: Mutex::new(outcomes.into_iter().collect()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// When each open attempt was made, oldest first
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    /// Open attempts made for one port label
    pub fn attempts_for(&self, label: &str) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(port, _)| port == label)
            .count()
    }
}

impl LinkOpener for ScriptedOpener {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, LinkError> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((config.label.clone(), Instant::now()));

        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(OpenOutcome::Link(link)) => Ok(Box::new(link)),
            Some(OpenOutcome::Fail(error)) => Err(error),
            None => Err(LinkError::Unavailable(format!("{} not present", config.device))),
        }
    }
}

/// Opener that routes each port label to its own script.
#[derive(Default)]
pub struct PerPortOpener {
    ports: Vec<(String, ScriptedOpener)>,
}

impl PerPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, label: &str, opener: ScriptedOpener) -> Self {
        self.ports.push((label.to_string(), opener));
        self
    }

    pub fn opener(&self, label: &str) -> Option<&ScriptedOpener> {
        self.ports.iter().find(|(l, _)| l == label).map(|(_, o)| o)
    }
}

impl LinkOpener for PerPortOpener {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, LinkError> {
        match self.opener(&config.label) {
            Some(opener) => opener.open(config),
            None => Err(LinkError::Unavailable(format!("{} not present", config.device))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_link_replays_in_order() {
        let mut link = ScriptedLink::new()
            .data(0, b"AB")
            .fail(0, LinkError::Io("unplugged".to_string()));
        // Data ahead of the failure is read out first
        assert_eq!(link.bytes_available(), Ok(2));
        let mut buf = [0u8; 8];
        assert_eq!(link.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"AB");
        assert_eq!(link.bytes_available(), Err(LinkError::Io("unplugged".to_string())));
        assert_eq!(link.bytes_available(), Ok(0));
    }

    #[test]
    fn test_empty_reads_hold_back_pending_bytes() {
        let mut link = ScriptedLink::new().data(0, b"AB").empty_reads(1);
        let mut buf = [0u8; 8];
        assert_eq!(link.bytes_available(), Ok(2));
        assert_eq!(link.read(&mut buf), Ok(0));
        assert_eq!(link.bytes_available(), Ok(2));
        assert_eq!(link.read(&mut buf), Ok(2));
    }

    #[test]
    fn test_clear_input_discards_due_data() {
        let mut link = ScriptedLink::new().data(0, b"stale").data(60_000, b"fresh");
        link.clear_input().unwrap();
        assert_eq!(link.bytes_available(), Ok(0));
    }

    #[test]
    fn test_opener_exhausts_to_unavailable() {
        let opener = ScriptedOpener::new([OpenOutcome::Link(ScriptedLink::new())]);
        let config = PortConfig::new("A", "/dev/null0", 9600);
        assert!(opener.open(&config).is_ok());
        assert!(matches!(opener.open(&config), Err(LinkError::Unavailable(_))));
        assert_eq!(opener.attempts().len(), 2);
        assert_eq!(opener.attempts_for("A"), 2);
    }
}
