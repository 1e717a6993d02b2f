// src/writer.rs
//
// Single consumer of the event queue. Commits each event to the sink and the
// console mirror in dequeue order, and keeps the run statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::display::ConsoleDisplay;
use crate::event::Event;
use crate::sink::EventSink;
use crate::stats::Statistics;

/// How long a receive waits before the drain flag is rechecked
const RECV_POLL: Duration = Duration::from_millis(50);

pub struct EventWriter {
    sink: Option<Box<dyn EventSink>>,
    display: Option<ConsoleDisplay>,
    stats: Arc<Mutex<Statistics>>,
}

impl EventWriter {
    pub fn new(
        sink: Option<Box<dyn EventSink>>,
        display: Option<ConsoleDisplay>,
        stats: Arc<Mutex<Statistics>>,
    ) -> Self {
        EventWriter {
            sink,
            display,
            stats,
        }
    }

    /// Consume events until the queue closes, or until `drain` is raised and
    /// everything already queued has been committed.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Event>, drain: Arc<AtomicBool>) {
        if let Some(sink) = &self.sink {
            tlog!("[Writer] Writing to {}", sink.describe());
        }

        let mut committed: u64 = 0;
        loop {
            if drain.load(Ordering::SeqCst) {
                while let Ok(event) = rx.try_recv() {
                    self.commit(event).await;
                    committed += 1;
                }
                break;
            }

            match tokio::time::timeout(RECV_POLL, rx.recv()).await {
                Ok(Some(event)) => {
                    self.commit(event).await;
                    committed += 1;
                }
                Ok(None) => break,
                Err(_) => {}
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.close().await;
        }
        tlog!("[Writer] Stopped after {} events", committed);
    }

    async fn commit(&mut self, event: Event) {
        let mut sink_failed = false;
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_line(event.record()).await {
                tlog!("[Writer] Sink write failed: {}", e);
                sink_failed = true;
            }
        }

        if let Some(display) = &self.display {
            display.show(&event);
        }

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.record(&event);
        if sink_failed {
            stats.sink_errors += 1;
        }
    }
}
