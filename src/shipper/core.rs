//! ShipperCore - buffering, flush decisions and shutdown
//!
//! Single-owner state machine: the actor drives it, tests drive it directly.
//! Nothing here is shared, so no locks are held across backend calls.

use super::buffer::{join_lines, LineBuffer};
use super::clock::ShipperClock;
use super::config::ShipperConfig;
use super::error::ShipperResult;
use super::object_store::AppendObjectStore;
use super::rotator::{RotatorStats, SegmentRotator};
use super::segment::SegmentNamer;
use serde::Serialize;
use tracing::{debug, error, warn};

/// Point-in-time view of the shipper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShipperStats {
    /// Lines handed to the shipper
    pub lines_received: u64,
    /// Lines confirmed appended to the backend
    pub lines_shipped: u64,
    /// Payload bytes confirmed appended
    pub bytes_shipped: u64,
    /// Lines discarded by the overflow policy
    pub lines_dropped: u64,
    /// Lines waiting in the buffer
    pub pending_lines: usize,
    /// Bytes waiting in the buffer
    pub pending_bytes: usize,
    /// Flushes that shipped at least one batch and ended with an empty buffer
    pub flushes: u64,
    /// Flushes abandoned after the append budget ran out
    pub failed_flushes: u64,
    /// Key of the segment receiving appends
    pub active_key: String,
    /// Locally tracked size of the active segment
    pub active_size: u64,
    /// Segments currently retained, active included
    pub retained_segments: usize,
    /// Rotation and append counters
    pub rotator: RotatorStats,
}

#[derive(Debug, Default)]
struct Counters {
    lines_received: u64,
    lines_shipped: u64,
    bytes_shipped: u64,
    flushes: u64,
    failed_flushes: u64,
}

/// Buffer plus rotator, driven one event at a time
pub struct ShipperCore<S: AppendObjectStore, C: ShipperClock> {
    rotator: SegmentRotator<S, C>,
    buffer: LineBuffer,
    clock: C,
    max_attempts: u32,
    max_batch_bytes: usize,
    counters: Counters,
}

impl<S: AppendObjectStore, C: ShipperClock> ShipperCore<S, C> {
    /// Validate the config, probe the backend and open the active segment
    pub async fn open(config: &ShipperConfig, store: S, clock: C) -> ShipperResult<Self> {
        config.validate()?;

        let namer = SegmentNamer::from_config(config).await;
        let rotator = SegmentRotator::open(
            store,
            clock.clone(),
            namer,
            config.max_segment_size,
            config.retention_limit,
        )
        .await?;
        let buffer = LineBuffer::new(&config.flush, &config.buffer, clock.now());

        Ok(ShipperCore {
            rotator,
            buffer,
            clock,
            max_attempts: config.append.max_attempts,
            max_batch_bytes: config.buffer.max_batch_bytes,
            counters: Counters::default(),
        })
    }

    /// Accept one rendered line, flushing if a trigger fires.
    ///
    /// A flush failure is logged and returned; the lines stay buffered.
    pub async fn on_event(&mut self, line: String) -> ShipperResult<()> {
        self.rotator.rotate_if_full().await;

        self.counters.lines_received += 1;
        let dropped = self.buffer.accept(line);
        if dropped > 0 {
            warn!(
                dropped,
                total_dropped = self.buffer.dropped_lines(),
                pending_bytes = self.buffer.pending_bytes(),
                "Buffer full, dropped lines"
            );
        }

        if self.buffer.should_flush(self.clock.now()) {
            self.flush().await?;
        }
        Ok(())
    }

    /// Periodic timer: flush pending lines once the interval has elapsed
    pub async fn on_tick(&mut self) -> ShipperResult<()> {
        if !self.buffer.is_empty() && self.buffer.interval_elapsed(self.clock.now()) {
            self.flush().await?;
        }
        Ok(())
    }

    /// Ship everything buffered, batch by batch; returns lines shipped.
    ///
    /// On failure the failed batch goes back to the front of the buffer and
    /// earlier batches stay shipped.
    pub async fn flush(&mut self) -> ShipperResult<usize> {
        let mut shipped = 0;

        while !self.buffer.is_empty() {
            self.rotator.rotate_if_full().await;

            let batch = self.buffer.drain(self.max_batch_bytes);
            let payload = join_lines(&batch);

            match self
                .rotator
                .append_with_retry(&payload, self.max_attempts)
                .await
            {
                Ok(()) => {
                    shipped += batch.len();
                    self.counters.lines_shipped += batch.len() as u64;
                    self.counters.bytes_shipped += payload.len() as u64;
                    self.buffer.mark_flushed(self.clock.now());
                }
                Err(e) => {
                    self.buffer.restore(batch);
                    self.counters.failed_flushes += 1;
                    error!(
                        error = %e,
                        pending_lines = self.buffer.pending_count(),
                        "Flush failed, keeping lines buffered"
                    );
                    return Err(e);
                }
            }
        }

        if shipped > 0 {
            self.counters.flushes += 1;
            debug!(lines = shipped, key = %self.rotator.active().key, "Flushed");
        }
        Ok(shipped)
    }

    /// One best-effort final flush
    pub async fn on_shutdown(&mut self) -> ShipperResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        self.flush().await
    }

    pub fn stats(&self) -> ShipperStats {
        let active = self.rotator.active();
        ShipperStats {
            lines_received: self.counters.lines_received,
            lines_shipped: self.counters.lines_shipped,
            bytes_shipped: self.counters.bytes_shipped,
            lines_dropped: self.buffer.dropped_lines(),
            pending_lines: self.buffer.pending_count(),
            pending_bytes: self.buffer.pending_bytes(),
            flushes: self.counters.flushes,
            failed_flushes: self.counters.failed_flushes,
            active_key: active.key.clone(),
            active_size: active.size,
            retained_segments: self.rotator.ledger().len(),
            rotator: self.rotator.stats().clone(),
        }
    }

    pub fn rotator(&self) -> &SegmentRotator<S, C> {
        &self.rotator
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }
}
