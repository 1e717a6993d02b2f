// src/supervisor.rs
//
// Owns one tap run: starts a reader per port and the single writer, decides
// whether startup succeeded, and performs the bounded shutdown.
//
// Shutdown order: raise stop, join readers (bounded per reader), release the
// queue, then let the writer drain what is left (bounded overall). A reader
// stuck in a driver call is abandoned rather than allowed to hang the exit.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::display::ConsoleDisplay;
use crate::error::TapError;
use crate::io::serial::{FirstOpen, LinkOpener, PortReader, ReaderExit, ReaderOptions};
use crate::queue::EventQueue;
use crate::settings::TapSettings;
use crate::sink::EventSink;
use crate::stats::Statistics;
use crate::writer::EventWriter;

struct ReaderHandle {
    label: String,
    task: JoinHandle<ReaderExit>,
    dropped: Arc<AtomicU64>,
}

pub struct Supervisor {
    settings: TapSettings,
    stop: Arc<AtomicBool>,
    drain: Arc<AtomicBool>,
    readers: Vec<ReaderHandle>,
    writer: JoinHandle<()>,
    queue: Option<EventQueue>,
    stats: Arc<Mutex<Statistics>>,
    connected: usize,
}

impl Supervisor {
    /// Start a run. Returns once every port has made its first open attempt.
    ///
    /// Fails with `NoPorts` for an empty port list and with `AllPortsFailed`
    /// when not a single port could be opened; in that case everything
    /// already started has been shut down again.
    pub async fn start(
        settings: TapSettings,
        opener: Arc<dyn LinkOpener>,
        sink: Option<Box<dyn EventSink>>,
        display: Option<ConsoleDisplay>,
    ) -> Result<Self, TapError> {
        if settings.ports.is_empty() {
            return Err(TapError::NoPorts);
        }
        settings.validate()?;

        let (queue, rx) = EventQueue::new(settings.queue_capacity, settings.enqueue_timeout());
        let stats = Arc::new(Mutex::new(Statistics::new(
            settings.ports.iter().map(|p| p.label.as_str()),
        )));
        let stop = Arc::new(AtomicBool::new(false));
        let drain = Arc::new(AtomicBool::new(false));

        let writer = EventWriter::new(sink, display, stats.clone());
        let writer = tokio::spawn(writer.run(rx, drain.clone()));

        let options = ReaderOptions::from(&settings);
        let mut readers = Vec::with_capacity(settings.ports.len());
        let mut reports = Vec::with_capacity(settings.ports.len());
        for port in &settings.ports {
            let producer = queue.producer(&port.label);
            let dropped = producer.drop_counter();
            let (report_tx, report_rx) = oneshot::channel();
            let reader = PortReader::new(port.clone(), opener.clone(), options.clone());
            let reader_stop = stop.clone();
            let task = tokio::task::spawn_blocking(move || {
                reader.run_reporting(producer, reader_stop, Some(report_tx))
            });
            readers.push(ReaderHandle {
                label: port.label.clone(),
                task,
                dropped,
            });
            reports.push((port.label.clone(), report_rx));
        }

        let mut connected = 0;
        for (label, report) in reports {
            match report.await {
                Ok(FirstOpen::Connected) => connected += 1,
                Ok(FirstOpen::Failed(e)) => {
                    tlog!("[Supervisor] {} failed its first open: {}", label, e);
                }
                Err(_) => tlog!("[Supervisor] {} exited before reporting", label),
            }
        }

        let count = settings.ports.len();
        let supervisor = Supervisor {
            settings,
            stop,
            drain,
            readers,
            writer,
            queue: Some(queue),
            stats,
            connected,
        };

        if connected == 0 {
            tlog!("[Supervisor] None of the {} ports could be opened", count);
            supervisor.stop().await;
            return Err(TapError::AllPortsFailed { count });
        }

        tlog!("[Supervisor] Started: {}/{} ports connected", connected, count);
        Ok(supervisor)
    }

    /// Ports whose first open succeeded
    pub fn connected(&self) -> usize {
        self.connected
    }

    pub fn settings(&self) -> &TapSettings {
        &self.settings
    }

    /// Snapshot of the statistics so far (drop counts are only final after `stop`)
    pub fn stats(&self) -> Statistics {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stop every reader, drain the writer and return the final statistics.
    pub async fn stop(mut self) -> Statistics {
        tlog!("[Supervisor] Stopping");
        self.stop.store(true, Ordering::SeqCst);

        let join_timeout = self.settings.join_timeout();
        for reader in &mut self.readers {
            match tokio::time::timeout(join_timeout, &mut reader.task).await {
                Ok(Ok(ReaderExit::Stopped)) => {}
                Ok(Ok(ReaderExit::Misconfigured(e))) => {
                    tlog!("[Supervisor] {} exited early: {}", reader.label, e);
                }
                Ok(Err(e)) => tlog!("[Supervisor] {} reader panicked: {}", reader.label, e),
                Err(_) => tlog!(
                    "[Supervisor] {} reader did not stop within {:?}, abandoning it",
                    reader.label,
                    join_timeout
                ),
            }
        }

        // Readers have stopped producing; release our sender and drain
        self.queue.take();
        self.drain.store(true, Ordering::SeqCst);
        let drain_timeout = self.settings.drain_timeout();
        match tokio::time::timeout(drain_timeout, &mut self.writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tlog!("[Supervisor] Writer panicked: {}", e),
            Err(_) => {
                tlog!("[Supervisor] Writer did not drain within {:?}", drain_timeout);
                self.writer.abort();
            }
        }

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for reader in &self.readers {
            stats.set_dropped(&reader.label, reader.dropped.load(Ordering::Relaxed));
        }
        tlog!("[Supervisor] Stopped");
        stats
    }
}
