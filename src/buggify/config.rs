//! Fault injection configuration

use super::faults::{object_store, ALL_FAULTS};
use std::collections::HashMap;

/// Per-fault probabilities plus a global switch and multiplier
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Master switch; when false no fault ever triggers
    pub enabled: bool,
    /// Scales every configured probability (clamped to 1.0 after scaling)
    pub global_multiplier: f64,
    probabilities: HashMap<String, f64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultConfig {
    /// Enabled, with no per-fault probabilities set (explicit overrides only)
    pub fn new() -> Self {
        FaultConfig {
            enabled: true,
            global_multiplier: 1.0,
            probabilities: HashMap::new(),
        }
    }

    /// Nothing ever triggers
    pub fn disabled() -> Self {
        FaultConfig {
            enabled: false,
            ..Self::new()
        }
    }

    /// Low background fault rate on every known fault
    pub fn moderate() -> Self {
        let mut config = Self::new();
        for fault in ALL_FAULTS {
            config.set(fault, 0.01);
        }
        config.set(object_store::STALE_POSITION, 0.02);
        config
    }

    /// Set the probability of a single fault
    pub fn set(&mut self, fault_id: &str, probability: f64) {
        self.probabilities
            .insert(fault_id.to_string(), probability.clamp(0.0, 1.0));
    }

    /// Effective probability of a fault (0.0 when disabled or unset)
    pub fn get(&self, fault_id: &str) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        let base = self.probabilities.get(fault_id).copied().unwrap_or(0.0);
        (base * self.global_multiplier).clamp(0.0, 1.0)
    }
}
