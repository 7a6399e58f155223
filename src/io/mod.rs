//! I/O Abstractions for Deterministic Simulation
//!
//! Randomness used by fault injection goes through the `Rng` trait so that
//! simulated runs are reproducible from a single seed.

pub mod simulation;

pub use simulation::SimulatedRng;

/// Source of randomness for fault injection and workload generation
pub trait Rng: Send + 'static {
    /// Next raw 64-bit value
    fn next_u64(&mut self) -> u64;

    /// Returns true with the given probability (clamped to [0, 1])
    fn gen_bool(&mut self, probability: f64) -> bool;

    /// Uniform value in `[min, max)`; returns `min` when the range is empty
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}
