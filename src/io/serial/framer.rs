// src/io/serial/framer.rs
//
// Timing-gap frame assembly.
// Serial traffic on a tapped line carries no boundary markers we can rely on,
// so a frame is whatever arrives without a pause of `frame_timeout` or more.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

// =============================================================================
// Types
// =============================================================================

/// A byte sequence plus its arrival time, as handed over by the reader.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub bytes: Vec<u8>,
    pub arrived: Instant,
}

impl RawChunk {
    pub fn new(bytes: impl Into<Vec<u8>>, arrived: Instant) -> Self {
        RawChunk {
            bytes: bytes.into(),
            arrived,
        }
    }
}

/// A complete frame assembled from one port's byte stream
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Port label the bytes were read from
    pub port: String,
    /// Frame data bytes, in arrival order
    pub bytes: Vec<u8>,
    /// Arrival of the first chunk in the frame
    pub first_arrival: Instant,
    /// Arrival of the last chunk in the frame
    pub last_arrival: Instant,
    /// Wall-clock time the frame was finalized
    pub timestamp: DateTime<Local>,
    /// Whether this frame came from flush() on stop/disconnect rather than a timing gap
    pub incomplete: bool,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// =============================================================================
// Frame Assembler
// =============================================================================

/// Stateful per-port assembler for streaming data.
///
/// Chunks separated by less than `frame_timeout` are concatenated; a gap of
/// `frame_timeout` or more finalizes the buffered frame before the new chunk
/// is appended. `poll_idle` finalizes a frame when the line goes quiet.
pub struct FrameAssembler {
    port: String,
    frame_timeout: Duration,
    buffer: Vec<u8>,
    first_arrival: Option<Instant>,
    last_arrival: Option<Instant>,
}

impl FrameAssembler {
    pub fn new(port: impl Into<String>, frame_timeout: Duration) -> Self {
        FrameAssembler {
            port: port.into(),
            frame_timeout,
            buffer: Vec::with_capacity(256),
            first_arrival: None,
            last_arrival: None,
        }
    }

    pub fn frame_timeout(&self) -> Duration {
        self.frame_timeout
    }

    /// Bytes currently held for the frame in progress
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk that arrived at `at`.
    /// Returns the previous frame when this chunk starts a new one.
    pub fn push(&mut self, chunk: &[u8], at: Instant) -> Option<Frame> {
        if chunk.is_empty() {
            return None;
        }

        let completed = match self.last_arrival {
            Some(last) if !self.buffer.is_empty() && at.saturating_duration_since(last) >= self.frame_timeout => {
                self.take_frame(false)
            }
            _ => None,
        };

        if self.buffer.is_empty() {
            self.first_arrival = Some(at);
        }
        self.buffer.extend_from_slice(chunk);
        self.last_arrival = Some(at);

        completed
    }

    /// Feed a `RawChunk`
    pub fn push_chunk(&mut self, chunk: RawChunk) -> Option<Frame> {
        self.push(&chunk.bytes, chunk.arrived)
    }

    /// Finalize the buffered frame if nothing has arrived for `frame_timeout`.
    pub fn poll_idle(&mut self, now: Instant) -> Option<Frame> {
        match self.last_arrival {
            Some(last) if !self.buffer.is_empty() && now.saturating_duration_since(last) >= self.frame_timeout => {
                self.take_frame(false)
            }
            _ => None,
        }
    }

    /// Finalize whatever is buffered, regardless of timing.
    /// Call when the stream ends (stop or disconnect).
    pub fn flush(&mut self) -> Option<Frame> {
        self.take_frame(true)
    }

    fn take_frame(&mut self, incomplete: bool) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let last = self.last_arrival?;
        let first = self.first_arrival.unwrap_or(last);
        let bytes = std::mem::replace(&mut self.buffer, Vec::with_capacity(256));
        self.first_arrival = None;

        Some(Frame {
            port: self.port.clone(),
            bytes,
            first_arrival: first,
            last_arrival: last,
            timestamp: Local::now(),
            incomplete,
        })
    }
}
