//! Pending-line buffer with flush triggers
//!
//! Lines are stored newline-terminated, so a drained batch is shipped as the
//! plain concatenation of its lines. Insertion order is preserved through
//! drain and restore; lines only ever leave the buffer by being drained or by
//! the overflow policy. A restored batch is drained again as the same batch,
//! and overflow never drops its lines, so a retried append carries the same
//! bytes as the attempt that failed.

use super::clock::Timestamp;
use super::config::{BufferConfig, FlushConfig, OverflowPolicy};
use std::collections::VecDeque;
use std::time::Duration;

/// Terminate a line with exactly one trailing newline
pub fn terminate_line(mut line: String) -> String {
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

/// Concatenate newline-terminated lines into one append payload
pub fn join_lines(lines: &[String]) -> Vec<u8> {
    let total: usize = lines.iter().map(|l| l.len()).sum();
    let mut payload = Vec::with_capacity(total);
    for line in lines {
        payload.extend_from_slice(line.as_bytes());
    }
    payload
}

/// In-memory queue of lines awaiting shipment
#[derive(Debug)]
pub struct LineBuffer {
    lines: VecDeque<String>,
    pending_bytes: usize,
    /// Leading lines that form a restored batch
    pinned: usize,
    last_flush: Timestamp,
    max_lines: usize,
    interval: Duration,
    max_buffered_bytes: usize,
    overflow_policy: OverflowPolicy,
    dropped_lines: u64,
}

impl LineBuffer {
    pub fn new(flush: &FlushConfig, buffer: &BufferConfig, now: Timestamp) -> Self {
        debug_assert!(flush.max_lines >= 1, "Precondition: max_lines >= 1");
        debug_assert!(
            buffer.max_buffered_bytes > 0,
            "Precondition: max_buffered_bytes > 0"
        );

        LineBuffer {
            lines: VecDeque::new(),
            pending_bytes: 0,
            pinned: 0,
            last_flush: now,
            max_lines: flush.max_lines,
            interval: flush.interval,
            max_buffered_bytes: buffer.max_buffered_bytes,
            overflow_policy: buffer.overflow_policy,
            dropped_lines: 0,
        }
    }

    /// Queue a line; returns how many lines the overflow policy dropped
    pub fn accept(&mut self, line: String) -> usize {
        let line = terminate_line(line);
        let len = line.len();

        if len > self.max_buffered_bytes {
            self.dropped_lines += 1;
            return 1;
        }

        let mut dropped = 0;
        if self.pending_bytes + len > self.max_buffered_bytes {
            match self.overflow_policy {
                OverflowPolicy::DropNewest => {
                    self.dropped_lines += 1;
                    return 1;
                }
                OverflowPolicy::DropOldest => {
                    while self.pending_bytes + len > self.max_buffered_bytes {
                        // A restored batch stays whole for its retry
                        match self.lines.remove(self.pinned) {
                            Some(old) => {
                                self.pending_bytes -= old.len();
                                dropped += 1;
                            }
                            None => {
                                self.dropped_lines += dropped as u64 + 1;
                                return dropped + 1;
                            }
                        }
                    }
                }
            }
        }

        self.pending_bytes += len;
        self.lines.push_back(line);
        self.dropped_lines += dropped as u64;

        #[cfg(debug_assertions)]
        self.verify_invariants();

        dropped
    }

    /// Line-count or interval trigger reached
    pub fn should_flush(&self, now: Timestamp) -> bool {
        self.lines.len() >= self.max_lines || self.interval_elapsed(now)
    }

    /// Time since the last successful flush has reached the interval
    pub fn interval_elapsed(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.last_flush) >= self.interval
    }

    /// Remove the oldest lines up to `max_bytes` (always at least one line).
    ///
    /// A batch put back by `restore` comes out whole and alone.
    pub fn drain(&mut self, max_bytes: usize) -> Vec<String> {
        let mut batch = Vec::new();
        let mut batch_bytes = 0;
        let pinned = std::mem::take(&mut self.pinned);

        while let Some(front) = self.lines.front() {
            let full = if pinned > 0 {
                batch.len() == pinned
            } else {
                !batch.is_empty() && batch_bytes + front.len() > max_bytes
            };
            if full {
                break;
            }
            let Some(line) = self.lines.pop_front() else {
                break;
            };
            batch_bytes += line.len();
            self.pending_bytes -= line.len();
            batch.push(line);
        }

        batch
    }

    /// Put a drained batch back at the front, preserving order
    pub fn restore(&mut self, batch: Vec<String>) {
        self.pinned += batch.len();
        for line in batch.into_iter().rev() {
            self.pending_bytes += line.len();
            self.lines.push_front(line);
        }

        #[cfg(debug_assertions)]
        self.verify_invariants();
    }

    /// Reset the flush timer after a confirmed successful flush
    pub fn mark_flushed(&mut self, now: Timestamp) {
        self.last_flush = now;
    }

    pub fn pending_count(&self) -> usize {
        self.lines.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn last_flush(&self) -> Timestamp {
        self.last_flush
    }

    /// Lines discarded by the overflow policy since creation
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        let actual: usize = self.lines.iter().map(|l| l.len()).sum();
        debug_assert_eq!(
            self.pending_bytes, actual,
            "Invariant violated: pending_bytes out of sync"
        );
        debug_assert!(
            self.lines.iter().all(|l| l.ends_with('\n')),
            "Invariant violated: buffered line not newline-terminated"
        );
        debug_assert!(
            self.pinned <= self.lines.len(),
            "Invariant violated: restored batch longer than the buffer"
        );
    }
}
