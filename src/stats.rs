// src/stats.rs
//
// Run statistics. Counted by the writer as events are committed; drop counts
// are folded in by the supervisor at shutdown.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::direction::DirectionLabel;
use crate::event::{Event, EventKind};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PortStats {
    pub frames: u64,
    pub bytes: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub unknown_frames: u64,
    pub unknown_bytes: u64,
    /// Successful opens, including reconnects
    pub connects: u64,
    pub errors: u64,
    /// Events the queue refused for this port
    pub dropped_events: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Statistics {
    order: Vec<String>,
    ports: HashMap<String, PortStats>,
    /// Sink writes that failed (the events still count above)
    pub sink_errors: u64,
}

impl Statistics {
    /// Pre-register ports so the report lists them in configuration order,
    /// even the ones that never produced anything.
    pub fn new<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut stats = Statistics::default();
        for label in labels {
            stats.port_mut(label);
        }
        stats
    }

    fn port_mut(&mut self, label: &str) -> &mut PortStats {
        if !self.ports.contains_key(label) {
            self.order.push(label.to_string());
        }
        self.ports.entry(label.to_string()).or_default()
    }

    pub fn port(&self, label: &str) -> Option<&PortStats> {
        self.ports.get(label)
    }

    /// Per-port stats in registration order
    pub fn ports(&self) -> impl Iterator<Item = (&str, &PortStats)> {
        self.order
            .iter()
            .filter_map(|label| self.ports.get(label).map(|s| (label.as_str(), s)))
    }

    pub fn record(&mut self, event: &Event) {
        let port = self.port_mut(&event.port);
        match &event.kind {
            EventKind::Frame { frame, direction } => {
                let len = frame.len() as u64;
                port.frames += 1;
                port.bytes += len;
                match direction {
                    DirectionLabel::Tx => {
                        port.tx_frames += 1;
                        port.tx_bytes += len;
                    }
                    DirectionLabel::Rx => {
                        port.rx_frames += 1;
                        port.rx_bytes += len;
                    }
                    DirectionLabel::Unknown => {
                        port.unknown_frames += 1;
                        port.unknown_bytes += len;
                    }
                }
            }
            EventKind::Connected { .. } => port.connects += 1,
            EventKind::Error { .. } => port.errors += 1,
            EventKind::Disconnected { .. } => {}
        }
    }

    pub fn set_dropped(&mut self, label: &str, dropped: u64) {
        self.port_mut(label).dropped_events = dropped;
    }

    /// Sum over all ports
    pub fn totals(&self) -> PortStats {
        self.ports.values().fold(PortStats::default(), |mut acc, p| {
            acc.frames += p.frames;
            acc.bytes += p.bytes;
            acc.tx_frames += p.tx_frames;
            acc.tx_bytes += p.tx_bytes;
            acc.rx_frames += p.rx_frames;
            acc.rx_bytes += p.rx_bytes;
            acc.unknown_frames += p.unknown_frames;
            acc.unknown_bytes += p.unknown_bytes;
            acc.connects += p.connects;
            acc.errors += p.errors;
            acc.dropped_events += p.dropped_events;
            acc
        })
    }

    /// End-of-run report. Direction columns are left out when detection is off.
    pub fn render(&self, show_direction: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Capture statistics");
        let _ = writeln!(out, "{}", "=".repeat(60));
        for (label, port) in self.ports() {
            let _ = writeln!(out, "{}:", label);
            let _ = writeln!(out, "  Frames: {:<10} Bytes: {}", port.frames, port.bytes);
            if show_direction {
                let _ = writeln!(out, "  TX:     {:<10} Bytes: {}", port.tx_frames, port.tx_bytes);
                let _ = writeln!(out, "  RX:     {:<10} Bytes: {}", port.rx_frames, port.rx_bytes);
            }
            if port.connects > 1 || port.errors > 0 || port.dropped_events > 0 {
                let _ = writeln!(
                    out,
                    "  Connects: {}  Errors: {}  Dropped: {}",
                    port.connects, port.errors, port.dropped_events
                );
            }
        }
        let total = self.totals();
        let _ = writeln!(out, "{}", "-".repeat(60));
        let _ = writeln!(out, "Total: {} frames, {} bytes", total.frames, total.bytes);
        if self.sink_errors > 0 {
            let _ = writeln!(out, "Sink write failures: {}", self.sink_errors);
        }
        out
    }
}
