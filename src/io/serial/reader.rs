// src/io/serial/reader.rs
//
// Per-port reader: opens the link, polls it, cuts frames on timing gaps,
// classifies them and hands events to the queue. Runs on a blocking thread
// until stopped, reconnecting after any open or read failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::link::{LinkOpener, SerialLink};
use crate::error::LinkError;
use crate::event::Event;
use crate::queue::EventProducer;
use crate::session::{LinkState, PortSession};
use crate::settings::{DetectionConfig, PayloadFormat, PortConfig, TapSettings};

/// Upper bound on a single read
const READ_BUFFER_SIZE: usize = 4096;

/// Slice length for interruptible sleeps
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// Types
// ============================================================================

/// Run-wide reader parameters
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    pub frame_timeout: Duration,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub detection: DetectionConfig,
    pub format: PayloadFormat,
}

impl From<&TapSettings> for ReaderOptions {
    fn from(settings: &TapSettings) -> Self {
        ReaderOptions {
            frame_timeout: settings.frame_timeout(),
            poll_interval: settings.poll_interval(),
            reconnect_delay: settings.reconnect_delay(),
            detection: settings.detection.clone(),
            format: settings.log_format,
        }
    }
}

/// Why a reader returned
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderExit {
    /// Stop was requested
    Stopped,
    /// The port rejected its configuration on the very first open
    Misconfigured(LinkError),
}

/// Outcome of the first open attempt, reported once to whoever started the reader
#[derive(Debug, Clone, PartialEq)]
pub enum FirstOpen {
    Connected,
    Failed(LinkError),
}

// ============================================================================
// Port Reader
// ============================================================================

pub struct PortReader {
    config: PortConfig,
    opener: Arc<dyn LinkOpener>,
    options: ReaderOptions,
    session: PortSession,
}

impl PortReader {
    pub fn new(config: PortConfig, opener: Arc<dyn LinkOpener>, options: ReaderOptions) -> Self {
        let session = PortSession::new(
            &config,
            options.frame_timeout,
            &options.detection,
            options.format,
        );
        PortReader {
            config,
            opener,
            options,
            session,
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Block until `stop` is raised, or until the first open attempt fails
    /// with a configuration error.
    pub fn run(self, producer: EventProducer, stop: Arc<AtomicBool>) -> ReaderExit {
        self.run_reporting(producer, stop, None)
    }

    /// Like `run`, additionally reporting the first open outcome on `report`.
    pub fn run_reporting(
        mut self,
        producer: EventProducer,
        stop: Arc<AtomicBool>,
        mut report: Option<oneshot::Sender<FirstOpen>>,
    ) -> ReaderExit {
        let label = self.config.label.clone();
        tlog!(
            "[Serial:{}] Reader started for {} @ {} baud ({}), detection: {}",
            label,
            self.config.device,
            self.config.baud_rate,
            self.config.line_settings(),
            self.session.strategy()
        );

        let mut first_attempt = true;
        while !stop.load(Ordering::SeqCst) {
            self.session.transition(LinkState::Connecting);

            let link = match self.opener.open(&self.config) {
                Ok(link) => {
                    if let Some(tx) = report.take() {
                        let _ = tx.send(FirstOpen::Connected);
                    }
                    link
                }
                Err(e) => {
                    tlog!("[Serial:{}] Failed to open {}: {}", label, self.config.device, e);
                    self.session.transition(LinkState::Error);
                    producer.submit(Event::error(
                        &label,
                        format!("Failed to open {}: {}", self.config.device, e),
                    ));
                    if let Some(tx) = report.take() {
                        let _ = tx.send(FirstOpen::Failed(e.clone()));
                    }
                    if first_attempt && e.is_misconfiguration() {
                        self.session.transition(LinkState::Disconnected);
                        tlog!("[Serial:{}] Giving up: port configuration rejected", label);
                        return ReaderExit::Misconfigured(e);
                    }
                    first_attempt = false;
                    self.wait_to_reconnect(&stop);
                    continue;
                }
            };
            first_attempt = false;

            self.session.transition(LinkState::Connected);
            match self.stream(link, &producer, &stop) {
                Ok(()) => break,
                Err(e) => {
                    tlog!("[Serial:{}] Link lost: {}", label, e);
                    self.session.transition(LinkState::Error);
                    producer.submit(Event::error(&label, format!("Link lost: {}", e)));
                    self.wait_to_reconnect(&stop);
                }
            }
        }

        // Stop raised before the first attempt could report
        if let Some(tx) = report.take() {
            let _ = tx.send(FirstOpen::Failed(LinkError::Unavailable(
                "stopped before opening".to_string(),
            )));
        }

        self.session.transition(LinkState::Disconnected);
        producer.submit(Event::disconnected(&label, "stopped"));
        tlog!("[Serial:{}] Reader stopped", label);
        ReaderExit::Stopped
    }

    /// Poll an open link until stop (`Ok`) or a link failure (`Err`).
    /// The pending frame is flushed either way and the handle is released on return.
    fn stream(
        &mut self,
        mut link: Box<dyn SerialLink>,
        producer: &EventProducer,
        stop: &AtomicBool,
    ) -> Result<(), LinkError> {
        if let Err(e) = link.clear_input() {
            tlog!("[Serial:{}] Could not clear input buffer: {}", self.config.label, e);
        }
        tlog!(
            "[Serial:{}] Connected to {} @ {} baud",
            self.config.label,
            self.config.device,
            self.config.baud_rate
        );
        producer.submit(Event::connected(
            &self.config.label,
            &self.config.device,
            self.config.baud_rate,
            &self.config.line_settings(),
        ));

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let result = loop {
            if stop.load(Ordering::SeqCst) {
                break Ok(());
            }

            let available = match link.bytes_available() {
                Ok(n) => n,
                Err(e) => break Err(e),
            };

            let mut got_data = false;
            if available > 0 {
                let want = available.min(buf.len());
                match link.read(&mut buf[..want]) {
                    // Read timed out before the driver handed the bytes over; poll again
                    Ok(0) => {}
                    Ok(n) => {
                        got_data = true;
                        if let Some(event) = self.session.ingest(&buf[..n], Instant::now()) {
                            producer.submit(event);
                        }
                    }
                    Err(e) => break Err(e),
                }
            }

            if let Some(event) = self.session.poll_idle(Instant::now()) {
                producer.submit(event);
            }

            if !got_data {
                std::thread::sleep(self.options.poll_interval);
            }
        };

        if let Some(event) = self.session.flush() {
            producer.submit(event);
        }
        drop(link);
        result
    }

    fn wait_to_reconnect(&mut self, stop: &AtomicBool) {
        self.session.transition(LinkState::Reconnecting);
        sleep_unless_stopped(self.options.reconnect_delay, stop);
    }
}

/// Sleep for `total` in short slices, returning early once `stop` is raised.
/// Returns true when the full duration elapsed.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(STOP_CHECK_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::io::serial::testing::{OpenOutcome, ScriptedLink, ScriptedOpener};
    use crate::queue::EventQueue;
    use tokio::sync::mpsc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn options(reconnect_ms: u64) -> ReaderOptions {
        ReaderOptions {
            frame_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            reconnect_delay: Duration::from_millis(reconnect_ms),
            detection: DetectionConfig::default(),
            format: PayloadFormat::Hex,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Run a reader on its own thread, raise stop after `run_for`, and return
    /// its exit plus everything it queued.
    fn run_reader(
        opener: Arc<ScriptedOpener>,
        options: ReaderOptions,
        run_for: Duration,
    ) -> (ReaderExit, Vec<Event>) {
        let rt = runtime();
        let (queue, mut rx) =
            EventQueue::with_handle(1024, Duration::from_millis(200), rt.handle().clone());
        let producer = queue.producer("A");
        let stop = Arc::new(AtomicBool::new(false));

        let reader = PortReader::new(PortConfig::new("A", "/dev/ttyTEST0", 9600), opener, options);
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || reader.run(producer, thread_stop));

        std::thread::sleep(run_for);
        stop.store(true, Ordering::SeqCst);
        let exit = handle.join().unwrap();
        (exit, drain(&mut rx))
    }

    fn frames(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Frame { frame, .. } => Some(crate::event::format_hex(&frame.bytes)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_frames_split_on_gap() {
        let link = ScriptedLink::new()
            .data(5, b"AB")
            .data(10, b"C")
            .data(100, b"DE");
        let opener = Arc::new(ScriptedOpener::new([OpenOutcome::Link(link)]));

        let (exit, events) = run_reader(opener, options(1000), Duration::from_millis(300));

        assert_eq!(exit, ReaderExit::Stopped);
        assert_eq!(frames(&events), vec!["41 42 43", "44 45"]);
        assert!(matches!(events.first().map(|e| &e.kind), Some(EventKind::Connected { .. })));
        assert!(matches!(events.last().map(|e| &e.kind), Some(EventKind::Disconnected { .. })));
    }

    #[test]
    fn test_empty_read_keeps_link_open() {
        let link = ScriptedLink::new().data(5, b"ABC").empty_reads(1);
        let opener = Arc::new(ScriptedOpener::new([OpenOutcome::Link(link)]));

        let (exit, events) = run_reader(opener.clone(), options(50), Duration::from_millis(200));

        assert_eq!(exit, ReaderExit::Stopped);
        assert_eq!(opener.attempts().len(), 1);
        assert_eq!(frames(&events), vec!["41 42 43"]);
        assert!(!events
            .iter()
            .any(|e| matches!(e.kind, EventKind::Error { .. })));
    }

    #[test]
    fn test_open_failure_waits_before_reconnecting() {
        let opener = Arc::new(ScriptedOpener::new([
            OpenOutcome::Fail(LinkError::Unavailable("busy".to_string())),
            OpenOutcome::Link(ScriptedLink::new()),
        ]));

        let (exit, events) = run_reader(opener.clone(), options(200), Duration::from_millis(450));

        assert_eq!(exit, ReaderExit::Stopped);
        let attempts = opener.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - attempts[0] >= Duration::from_millis(200));

        let errors = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Error { .. }))
            .count();
        assert_eq!(errors, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::Connected { .. })));
    }

    #[test]
    fn test_link_loss_flushes_then_reconnects() {
        let link = ScriptedLink::new()
            .data(5, b"XY")
            .fail(20, LinkError::Io("unplugged".to_string()));
        let opener = Arc::new(ScriptedOpener::new([
            OpenOutcome::Link(link),
            OpenOutcome::Link(ScriptedLink::new()),
        ]));

        let (_, events) = run_reader(opener.clone(), options(50), Duration::from_millis(200));

        assert_eq!(opener.attempts().len(), 2);
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e.kind {
                EventKind::Frame { .. } => "frame",
                EventKind::Connected { .. } => "connected",
                EventKind::Error { .. } => "error",
                EventKind::Disconnected { .. } => "disconnected",
            })
            .collect();
        assert_eq!(kinds, vec!["connected", "frame", "error", "connected", "disconnected"]);
        assert_eq!(frames(&events), vec!["58 59"]);
    }

    #[test]
    fn test_misconfiguration_on_first_open_is_fatal() {
        let opener = Arc::new(ScriptedOpener::new([OpenOutcome::Fail(LinkError::Misconfigured(
            "unsupported baud".to_string(),
        ))]));
        let rt = runtime();
        let (queue, mut rx) =
            EventQueue::with_handle(16, Duration::from_millis(200), rt.handle().clone());
        let reader = PortReader::new(
            PortConfig::new("A", "/dev/ttyTEST0", 9600),
            opener.clone(),
            options(10),
        );
        let (report_tx, mut report_rx) = oneshot::channel();

        let exit = reader.run_reporting(
            queue.producer("A"),
            Arc::new(AtomicBool::new(false)),
            Some(report_tx),
        );

        assert!(matches!(exit, ReaderExit::Misconfigured(_)));
        assert!(matches!(report_rx.try_recv(), Ok(FirstOpen::Failed(LinkError::Misconfigured(_)))));
        assert_eq!(opener.attempts().len(), 1);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(events[0].record().contains("ERROR Failed to open /dev/ttyTEST0"));
    }

    #[test]
    fn test_first_open_success_is_reported() {
        let opener = Arc::new(ScriptedOpener::new([OpenOutcome::Link(ScriptedLink::new())]));
        let rt = runtime();
        let (queue, _rx) = EventQueue::with_handle(16, Duration::from_millis(200), rt.handle().clone());
        let producer = queue.producer("A");
        let stop = Arc::new(AtomicBool::new(false));
        let (report_tx, report_rx) = oneshot::channel();

        let reader = PortReader::new(PortConfig::new("A", "/dev/ttyTEST0", 9600), opener, options(10));
        let thread_stop = stop.clone();
        let handle =
            std::thread::spawn(move || reader.run_reporting(producer, thread_stop, Some(report_tx)));

        assert_eq!(report_rx.blocking_recv(), Ok(FirstOpen::Connected));
        stop.store(true, Ordering::SeqCst);
        assert_eq!(handle.join().unwrap(), ReaderExit::Stopped);
    }

    #[test]
    fn test_sleep_unless_stopped_returns_early() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_unless_stopped(Duration::from_secs(5), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
