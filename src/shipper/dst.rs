//! Deterministic Simulation Testing for the shipper
//!
//! Drives a [`ShipperCore`] over a fault-injecting store with a simulated
//! clock, then checks the shipped objects against the lines the core accepted:
//!
//! 1. **No loss, no duplication**: the segments concatenated in index order
//!    equal the accepted lines in order. The store also loses responses to
//!    appends it has applied, so a blind retry shows up as a duplicate.
//! 2. **Bounded segments**: no segment grows past `max_segment_size` by more
//!    than one batch.
//! 3. **Bounded retention**: the ledger never tracks more than
//!    `retention_limit` keys.
//!
//! Every run is reproducible from its seed.

use super::clock::{ShipperClock, SimulatedClock};
use super::config::ShipperConfig;
use super::core::ShipperCore;
use super::object_store::InMemoryAppendStore;
use super::simulated_store::{SimulatedAppendStore, SimulatedStoreConfig, SimulatedStoreStats};
use crate::buggify::{self, FaultConfig};
use crate::io::{Rng, SimulatedRng};
use std::time::Duration;

/// 2024-03-15T12:00:00Z, far enough from midnight that runs never cross a date
const DST_START_MS: u64 = 1_710_504_000_000;

/// Attempts at opening the core before a run is declared failed
const OPEN_ATTEMPTS: u32 = 32;

/// Configuration for a shipper DST run
#[derive(Debug, Clone)]
pub struct ShipperDSTConfig {
    /// Lines produced by the workload
    pub num_lines: usize,
    /// Shortest generated line, newline excluded
    pub min_line_len: u64,
    /// Longest generated line, newline excluded
    pub max_line_len: u64,
    pub max_segment_size: u64,
    pub retention_limit: usize,
    pub flush_max_lines: usize,
    pub flush_interval: Duration,
    pub max_batch_bytes: usize,
    pub max_attempts: u32,
    /// Upper bound of each random clock step between lines
    pub max_clock_step_ms: u64,
    /// Probability of a timer tick after each line
    pub tick_prob: f64,
    pub store: SimulatedStoreConfig,
}

impl Default for ShipperDSTConfig {
    fn default() -> Self {
        ShipperDSTConfig {
            num_lines: 500,
            min_line_len: 8,
            max_line_len: 120,
            max_segment_size: 2048,
            retention_limit: 10_000,
            flush_max_lines: 16,
            flush_interval: Duration::from_secs(5),
            max_batch_bytes: 512,
            max_attempts: 10,
            max_clock_step_ms: 400,
            tick_prob: 0.2,
            store: SimulatedStoreConfig::default(),
        }
    }
}

impl ShipperDSTConfig {
    /// No faults at all
    pub fn baseline() -> Self {
        ShipperDSTConfig {
            store: SimulatedStoreConfig::no_faults(),
            ..Default::default()
        }
    }

    /// Background fault rate
    pub fn moderate() -> Self {
        Self::default()
    }

    /// Frequent faults, small segments and a tight retry budget
    pub fn chaos() -> Self {
        ShipperDSTConfig {
            num_lines: 800,
            max_segment_size: 700,
            max_batch_bytes: 256,
            max_attempts: 3,
            store: SimulatedStoreConfig::high_chaos(),
            ..Default::default()
        }
    }

    fn shipper_config(&self) -> ShipperConfig {
        let mut config = ShipperConfig::test();
        config.max_segment_size = self.max_segment_size;
        config.retention_limit = self.retention_limit;
        config.flush.max_lines = self.flush_max_lines;
        config.flush.interval = self.flush_interval;
        config.buffer.max_batch_bytes = self.max_batch_bytes;
        config.append.max_attempts = self.max_attempts;
        config
    }
}

/// Outcome of a single DST run
#[derive(Debug, Clone)]
pub struct ShipperDSTResult {
    pub seed: u64,
    /// Lines fed to the core
    pub lines: usize,
    /// Lines confirmed shipped, final flush included
    pub shipped: u64,
    /// Flushes that ran out of attempts and kept their lines
    pub failed_flushes: u64,
    pub rotations: u64,
    /// Objects left in the backend
    pub segments: usize,
    pub store_stats: SimulatedStoreStats,
    pub passed: bool,
    pub error_message: Option<String>,
}

type DSTStore = SimulatedAppendStore<InMemoryAppendStore, SimulatedRng>;

/// Harness for one seeded shipper run
pub struct ShipperDSTHarness {
    seed: u64,
    config: ShipperDSTConfig,
    rng: SimulatedRng,
    inner: InMemoryAppendStore,
    store: DSTStore,
    clock: SimulatedClock,
    /// Every line accepted by the core, newline-terminated, in order
    accepted: Vec<String>,
}

impl ShipperDSTHarness {
    pub fn new(seed: u64, config: ShipperDSTConfig) -> Self {
        let mut rng = SimulatedRng::new(seed);
        let inner = InMemoryAppendStore::new();
        let store = SimulatedAppendStore::new(inner.clone(), rng.fork(), config.store.clone());

        ShipperDSTHarness {
            seed,
            config,
            rng,
            inner,
            store,
            clock: SimulatedClock::new(DST_START_MS),
            accepted: Vec::new(),
        }
    }

    /// Run the workload, drain with faults off, then verify the backend
    pub async fn run(&mut self) -> ShipperDSTResult {
        buggify::set_config(FaultConfig::new());
        let outcome = self.run_workload().await;
        buggify::set_config(FaultConfig::disabled());

        let (shipped, failed_flushes, rotations, error) = match outcome {
            Ok(counts) => (counts.0, counts.1, counts.2, self.verify().err()),
            Err(e) => (0, 0, 0, Some(e)),
        };

        ShipperDSTResult {
            seed: self.seed,
            lines: self.accepted.len(),
            shipped,
            failed_flushes,
            rotations,
            segments: self.inner.len(),
            store_stats: self.store.stats(),
            passed: error.is_none(),
            error_message: error,
        }
    }

    async fn run_workload(&mut self) -> Result<(u64, u64, u64), String> {
        let shipper_config = self.config.shipper_config();
        let mut core = self.open_core(&shipper_config).await?;

        for i in 0..self.config.num_lines {
            let line = self.generate_line(i);
            self.accepted.push(format!("{}\n", line));
            // A failed flush keeps its lines buffered; the next trigger retries
            let _ = core.on_event(line).await;

            let step = self.rng.gen_range(0, self.config.max_clock_step_ms + 1);
            self.clock.advance_ms(step);
            if self.rng.gen_bool(self.config.tick_prob) {
                let _ = core.on_tick().await;
            }

            let ledger = core.rotator().ledger();
            if ledger.len() > ledger.retention_limit() {
                return Err(format!(
                    "ledger holds {} keys, retention limit {}",
                    ledger.len(),
                    ledger.retention_limit()
                ));
            }
        }

        buggify::set_config(FaultConfig::disabled());
        core.on_shutdown()
            .await
            .map_err(|e| format!("final flush failed with faults disabled: {}", e))?;

        let stats = core.stats();
        if stats.pending_lines != 0 {
            return Err(format!("{} lines still pending after shutdown", stats.pending_lines));
        }
        if stats.lines_dropped != 0 {
            return Err(format!("{} lines dropped by the buffer", stats.lines_dropped));
        }
        Ok((stats.lines_shipped, stats.failed_flushes, stats.rotator.rotations()))
    }

    async fn open_core(
        &mut self,
        config: &ShipperConfig,
    ) -> Result<ShipperCore<DSTStore, SimulatedClock>, String> {
        let mut last_error = String::new();
        for _ in 0..OPEN_ATTEMPTS {
            match ShipperCore::open(config, self.store.clone(), self.clock.clone()).await {
                Ok(core) => return Ok(core),
                Err(e) => {
                    last_error = e.to_string();
                    self.clock.advance_ms(100);
                }
            }
        }
        Err(format!("open failed {} times: {}", OPEN_ATTEMPTS, last_error))
    }

    fn generate_line(&mut self, i: usize) -> String {
        let mut line = format!("seed={} line={} ts={}", self.seed, i, self.clock.now().as_millis());
        let target = self
            .rng
            .gen_range(self.config.min_line_len, self.config.max_line_len + 1) as usize;
        while line.len() < target {
            line.push((b'a' + (self.rng.gen_range(0, 26) as u8)) as char);
        }
        line
    }

    fn verify(&self) -> Result<(), String> {
        let mut segments = Vec::new();
        for key in self.inner.keys() {
            let index = segment_index(&key).ok_or_else(|| format!("unparseable key {}", key))?;
            let data = self
                .inner
                .object(&key)
                .ok_or_else(|| format!("listed key {} vanished", key))?;
            segments.push((index, key, data));
        }
        segments.sort_by_key(|(index, _, _)| *index);

        let bound = self.config.max_segment_size + self.config.max_batch_bytes as u64;
        let mut shipped = Vec::new();
        for (_, key, data) in &segments {
            if data.len() as u64 > bound {
                return Err(format!("{} holds {} bytes, bound {}", key, data.len(), bound));
            }
            shipped.extend_from_slice(data);
        }

        let expected = self.accepted.concat();
        if shipped != expected.as_bytes() {
            let shipped_lines = String::from_utf8_lossy(&shipped).lines().count();
            return Err(format!(
                "backend holds {} lines ({} bytes), accepted {} lines ({} bytes)",
                shipped_lines,
                shipped.len(),
                self.accepted.len(),
                expected.len()
            ));
        }
        Ok(())
    }
}

/// Index suffix of `{dir}/{prefix}_{date}_{index}.log`
fn segment_index(key: &str) -> Option<u64> {
    key.strip_suffix(".log")?.rsplit('_').next()?.parse().ok()
}

/// Run `count` seeds starting at `start_seed`
pub async fn run_dst_batch(
    start_seed: u64,
    count: usize,
    config: ShipperDSTConfig,
) -> Vec<ShipperDSTResult> {
    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        let mut harness = ShipperDSTHarness::new(start_seed + i as u64, config.clone());
        results.push(harness.run().await);
    }
    results
}

/// Summarize batch results
pub fn summarize_batch(results: &[ShipperDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();

    let lines: usize = results.iter().map(|r| r.lines).sum();
    let failed_flushes: u64 = results.iter().map(|r| r.failed_flushes).sum();
    let rotations: u64 = results.iter().map(|r| r.rotations).sum();
    let append_failures: u64 = results
        .iter()
        .map(|r| r.store_stats.append_failures + r.store_stats.stale_positions)
        .sum();
    let lost_acks: u64 = results.iter().map(|r| r.store_stats.lost_acks).sum();

    let mut summary = format!(
        "Shipper DST Batch: {}/{} passed\n\
         Lines: {}, Rotations: {}, Failed flushes: {}, Injected append faults: {}, \
         Lost responses: {}",
        passed, total, lines, rotations, failed_flushes, append_failures, lost_acks
    );

    if passed < total {
        summary.push_str("\n\nFailed seeds:");
        for r in results.iter().filter(|r| !r.passed) {
            summary.push_str(&format!(
                "\n  Seed {}: {}",
                r.seed,
                r.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    summary
}
