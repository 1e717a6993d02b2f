// src/queue.rs
//
// Bounded event queue between the port readers and the writer.
// Readers run on blocking threads and must never stall indefinitely on a slow
// sink: a submit waits at most `enqueue_timeout` for room, then drops the event
// and counts the drop against the submitting port.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use crate::event::Event;

/// Shared side of the queue: hands out per-port producers and reports the
/// queue-wide drop total.
pub struct EventQueue {
    tx: mpsc::Sender<Event>,
    enqueue_timeout: Duration,
    dropped_total: Arc<AtomicU64>,
    handle: Handle,
}

impl EventQueue {
    /// Create a queue on the current tokio runtime.
    /// Panics when called outside a runtime, like `tokio::spawn`.
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> (Self, mpsc::Receiver<Event>) {
        Self::with_handle(capacity, enqueue_timeout, Handle::current())
    }

    pub fn with_handle(
        capacity: usize,
        enqueue_timeout: Duration,
        handle: Handle,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = EventQueue {
            tx,
            enqueue_timeout,
            dropped_total: Arc::new(AtomicU64::new(0)),
            handle,
        };
        (queue, rx)
    }

    /// Producer for one port. Each producer counts its own drops.
    pub fn producer(&self, port: &str) -> EventProducer {
        EventProducer {
            port: port.to_string(),
            tx: self.tx.clone(),
            enqueue_timeout: self.enqueue_timeout,
            dropped: Arc::new(AtomicU64::new(0)),
            dropped_total: self.dropped_total.clone(),
            handle: self.handle.clone(),
        }
    }

    /// Events dropped by every producer so far
    pub fn dropped(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

/// Reader-side handle. Blocking: call from a reader thread, never from async code.
#[derive(Clone)]
pub struct EventProducer {
    port: String,
    tx: mpsc::Sender<Event>,
    enqueue_timeout: Duration,
    dropped: Arc<AtomicU64>,
    dropped_total: Arc<AtomicU64>,
    handle: Handle,
}

impl EventProducer {
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Enqueue `event`, waiting up to the enqueue timeout for room.
    /// Returns false when the event was dropped.
    pub fn submit(&self, event: Event) -> bool {
        let event = match self.tx.try_send(event) {
            Ok(()) => return true,
            Err(TrySendError::Full(event)) => event,
            Err(TrySendError::Closed(_)) => {
                self.record_drop("queue closed");
                return false;
            }
        };

        match self
            .handle
            .block_on(self.tx.send_timeout(event, self.enqueue_timeout))
        {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                self.record_drop("queue full");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.record_drop("queue closed");
                false
            }
        }
    }

    /// Events this producer has dropped
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared counter behind `dropped`, for reading after the producer is gone
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }

    fn record_drop(&self, reason: &str) {
        let count = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        // First drop and then every 1000th, so a stuck sink doesn't flood stderr
        if count == 1 || count % 1000 == 0 {
            tlog!(
                "[Queue:{}] Dropped event ({}), {} dropped so far",
                self.port,
                reason,
                count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_full_queue_drops_after_timeout() {
        let rt = runtime();
        let (queue, mut rx) =
            EventQueue::with_handle(1, Duration::from_millis(50), rt.handle().clone());
        let producer = queue.producer("DeviceA");

        let result = std::thread::spawn(move || {
            assert!(producer.submit(Event::error("DeviceA", "one")));
            let started = Instant::now();
            let accepted = producer.submit(Event::error("DeviceA", "two"));
            (accepted, started.elapsed(), producer.dropped())
        })
        .join()
        .unwrap();

        let (accepted, waited, dropped) = result;
        assert!(!accepted);
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_secs(2));
        assert_eq!(dropped, 1);
        assert_eq!(queue.dropped(), 1);

        // Only the first event made it in
        let first = rx.try_recv().unwrap();
        assert!(first.record().ends_with("ERROR one"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_submit_waits_for_room() {
        let rt = runtime();
        let (queue, mut rx) =
            EventQueue::with_handle(1, Duration::from_millis(1000), rt.handle().clone());
        let producer = queue.producer("DeviceA");

        // Consumer frees the slot well within the enqueue timeout
        let consumer = rt.spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let mut seen = Vec::new();
            while seen.len() < 2 {
                match rx.recv().await {
                    Some(event) => seen.push(event),
                    None => break,
                }
            }
            seen
        });

        let accepted = std::thread::spawn(move || {
            let a = producer.submit(Event::error("DeviceA", "one"));
            let b = producer.submit(Event::error("DeviceA", "two"));
            (a, b, producer.dropped())
        })
        .join()
        .unwrap();

        assert_eq!(accepted, (true, true, 0));
        let seen = rt.block_on(consumer).unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_drops_are_counted_per_port() {
        let rt = runtime();
        let (queue, _rx) = EventQueue::with_handle(1, Duration::from_millis(10), rt.handle().clone());
        let a = queue.producer("A");
        let b = queue.producer("B");
        let counter_b = b.drop_counter();

        std::thread::spawn(move || {
            a.submit(Event::error("A", "fills the slot"));
            a.submit(Event::error("A", "dropped"));
            b.submit(Event::error("B", "dropped"));
            b.submit(Event::error("B", "dropped"));
        })
        .join()
        .unwrap();

        assert_eq!(counter_b.load(Ordering::Relaxed), 2);
        assert_eq!(queue.dropped(), 3);
    }

    #[test]
    fn test_closed_queue_counts_as_drop() {
        let rt = runtime();
        let (queue, rx) = EventQueue::with_handle(4, Duration::from_millis(10), rt.handle().clone());
        drop(rx);
        let producer = queue.producer("A");
        assert!(!producer.submit(Event::error("A", "nobody listening")));
        assert_eq!(producer.dropped(), 1);
    }
}
