//! Simulated Append Store with Fault Injection
//!
//! DST-compatible wrapper that injects faults using buggify.
//! Most faults fire before the inner store is touched. The one exception is
//! `TIMEOUT_AFTER_APPLY`: the append lands, then the caller sees a timeout,
//! as when a response is lost on the way back.

use super::object_store::{AppendObjectStore, ObjectMeta, ObjectStoreError, StoreFuture};
use crate::buggify::faults::object_store as faults;
use crate::io::Rng;
use parking_lot::Mutex;
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of an operation timing out
    pub timeout_prob: f64,
    /// Probability of an append being applied but reported as a timeout
    pub timeout_after_apply_prob: f64,
    /// Probability of a transient append failure
    pub append_fail_prob: f64,
    /// Probability of an append rejected as stale even at the right position
    pub stale_position_prob: f64,
    /// Probability of HEAD failure
    pub head_fail_prob: f64,
    /// Probability of an existence probe failing
    pub exists_fail_prob: f64,
    /// Probability of DELETE failure
    pub delete_fail_prob: f64,
    /// Probability of a prefix listing failing
    pub list_fail_prob: f64,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            timeout_prob: 0.005,             // 0.5%
            timeout_after_apply_prob: 0.005, // 0.5%
            append_fail_prob: 0.01,          // 1%
            stale_position_prob: 0.02,       // 2%
            head_fail_prob: 0.01,            // 1%
            exists_fail_prob: 0.005,         // 0.5%
            delete_fail_prob: 0.01,          // 1%
            list_fail_prob: 0.01,            // 1%
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            timeout_prob: 0.03,
            timeout_after_apply_prob: 0.03,
            append_fail_prob: 0.08,
            stale_position_prob: 0.10,
            head_fail_prob: 0.05,
            exists_fail_prob: 0.02,
            delete_fail_prob: 0.10,
            list_fail_prob: 0.05,
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            timeout_prob: 0.0,
            timeout_after_apply_prob: 0.0,
            append_fail_prob: 0.0,
            stale_position_prob: 0.0,
            head_fail_prob: 0.0,
            exists_fail_prob: 0.0,
            delete_fail_prob: 0.0,
            list_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub append_attempts: u64,
    pub append_failures: u64,
    pub stale_positions: u64,
    pub head_attempts: u64,
    pub head_failures: u64,
    pub exists_attempts: u64,
    pub exists_failures: u64,
    pub delete_attempts: u64,
    pub delete_failures: u64,
    pub list_attempts: u64,
    pub list_failures: u64,
    pub timeouts: u64,
    /// Appends applied by the inner store but reported as timeouts
    pub lost_acks: u64,
}

struct SimulatedStoreInner<R: Rng> {
    rng: R,
    stats: SimulatedStoreStats,
}

/// Append store that wraps another store and injects faults
pub struct SimulatedAppendStore<S: AppendObjectStore, R: Rng> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner<R>>>,
}

impl<S: AppendObjectStore, R: Rng> SimulatedAppendStore<S, R> {
    /// Create a new simulated store with the given RNG
    pub fn new(inner_store: S, rng: R, config: SimulatedStoreConfig) -> Self {
        SimulatedAppendStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng,
                stats: SimulatedStoreStats::default(),
            })),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.state.lock().stats = SimulatedStoreStats::default();
    }

    fn inject(&self, fault_id: &str, probability: f64) -> bool {
        let mut s = self.state.lock();
        crate::buggify!(&mut s.rng, fault_id, probability)
    }

    fn check_timeout(&self, op: &str, key: &str) -> Result<(), ObjectStoreError> {
        if self.inject(faults::TIMEOUT, self.config.timeout_prob) {
            self.state.lock().stats.timeouts += 1;
            return Err(ObjectStoreError::Timeout(format!(
                "simulated {} timeout for {}",
                op, key
            )));
        }
        Ok(())
    }
}

impl<S: AppendObjectStore, R: Rng> AppendObjectStore for SimulatedAppendStore<S, R> {
    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        position: u64,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            self.state.lock().stats.append_attempts += 1;
            self.check_timeout("append", key)?;

            if self.inject(faults::APPEND_FAIL, self.config.append_fail_prob) {
                self.state.lock().stats.append_failures += 1;
                return Err(ObjectStoreError::Unavailable(format!(
                    "simulated append failure for {}",
                    key
                )));
            }

            if self.inject(faults::STALE_POSITION, self.config.stale_position_prob) {
                self.state.lock().stats.stale_positions += 1;
                return Err(ObjectStoreError::PositionMismatch {
                    key: key.to_string(),
                    requested: position,
                    actual: None,
                });
            }

            let next_position = self.inner_store.append_at(key, data, position).await?;

            if self.inject(
                faults::TIMEOUT_AFTER_APPLY,
                self.config.timeout_after_apply_prob,
            ) {
                self.state.lock().stats.lost_acks += 1;
                return Err(ObjectStoreError::Timeout(format!(
                    "simulated lost response for {}",
                    key
                )));
            }

            Ok(next_position)
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            self.state.lock().stats.head_attempts += 1;
            self.check_timeout("head", key)?;

            if self.inject(faults::HEAD_FAIL, self.config.head_fail_prob) {
                self.state.lock().stats.head_failures += 1;
                return Err(ObjectStoreError::Other(format!(
                    "simulated head failure for {}",
                    key
                )));
            }

            self.inner_store.head(key).await
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.state.lock().stats.exists_attempts += 1;

            if self.inject(faults::EXISTS_FAIL, self.config.exists_fail_prob) {
                self.state.lock().stats.exists_failures += 1;
                return Err(ObjectStoreError::Other(format!(
                    "simulated exists failure for {}",
                    key
                )));
            }

            self.inner_store.exists(key).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().stats.delete_attempts += 1;

            if self.inject(faults::DELETE_FAIL, self.config.delete_fail_prob) {
                self.state.lock().stats.delete_failures += 1;
                return Err(ObjectStoreError::Other(format!(
                    "simulated delete failure for {}",
                    key
                )));
            }

            self.inner_store.delete(key).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        self.inner_store.get(key)
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.state.lock().stats.list_attempts += 1;
            self.check_timeout("list", prefix)?;

            if self.inject(faults::LIST_FAIL, self.config.list_fail_prob) {
                self.state.lock().stats.list_failures += 1;
                return Err(ObjectStoreError::Other(format!(
                    "simulated list failure for {}",
                    prefix
                )));
            }

            self.inner_store.list(prefix).await
        })
    }
}

impl<S: AppendObjectStore + Clone, R: Rng> Clone for SimulatedAppendStore<S, R> {
    fn clone(&self) -> Self {
        SimulatedAppendStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}
