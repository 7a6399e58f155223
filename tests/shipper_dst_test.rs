//! Shipper DST Tests
//!
//! Deterministic simulation tests (FoundationDB-style, seed-based) for the
//! shipper. Each run feeds lines through the core over a fault-injecting
//! store, drains with faults off, and checks that the backend holds every
//! accepted line exactly once, in order.
//!
//! ## Test Categories
//!
//! - **Baseline tests**: No faults, verify basic correctness
//! - **Moderate tests**: Background faults, verify resilience
//! - **Chaos tests**: Many faults and a tight retry budget

use rolling_shipper::shipper::{
    run_dst_batch, summarize_batch, ShipperDSTConfig, ShipperDSTHarness, SimulatedStoreConfig,
};

// =============================================================================
// Single Seed Tests
// =============================================================================

#[tokio::test]
async fn test_shipper_dst_single_baseline() {
    let mut harness = ShipperDSTHarness::new(12345, ShipperDSTConfig::baseline());
    let result = harness.run().await;

    assert!(result.passed, "{:?}", result.error_message);
    assert_eq!(result.shipped, result.lines as u64);
    assert_eq!(result.store_stats.append_failures, 0);
}

#[tokio::test]
async fn test_shipper_dst_single_chaos() {
    let mut harness = ShipperDSTHarness::new(54321, ShipperDSTConfig::chaos());
    let result = harness.run().await;

    assert!(result.passed, "{:?}", result.error_message);
    assert!(result.rotations > 0);
}

// =============================================================================
// Multi-Seed Batches
// =============================================================================

#[tokio::test]
async fn test_shipper_dst_batch_baseline() {
    let results = run_dst_batch(0, 20, ShipperDSTConfig::baseline()).await;
    let summary = summarize_batch(&results);
    println!("{}", summary);

    assert!(results.iter().all(|r| r.passed), "{}", summary);
    assert!(results.iter().all(|r| r.failed_flushes == 0), "{}", summary);
}

#[tokio::test]
async fn test_shipper_dst_batch_moderate() {
    let results = run_dst_batch(10_000, 50, ShipperDSTConfig::moderate()).await;
    let summary = summarize_batch(&results);
    println!("{}", summary);

    assert!(results.iter().all(|r| r.passed), "{}", summary);
}

#[tokio::test]
async fn test_shipper_dst_batch_chaos() {
    let results = run_dst_batch(20_000, 50, ShipperDSTConfig::chaos()).await;
    let summary = summarize_batch(&results);
    println!("{}", summary);

    assert!(results.iter().all(|r| r.passed), "{}", summary);
    let failed_flushes: u64 = results.iter().map(|r| r.failed_flushes).sum();
    assert!(failed_flushes > 0, "chaos should exhaust the retry budget at least once");
}

#[tokio::test]
async fn test_shipper_dst_stale_positions_only() {
    let config = ShipperDSTConfig {
        max_attempts: 2,
        store: SimulatedStoreConfig {
            stale_position_prob: 0.3,
            ..SimulatedStoreConfig::no_faults()
        },
        ..ShipperDSTConfig::baseline()
    };
    let results = run_dst_batch(30_000, 20, config).await;
    let summary = summarize_batch(&results);
    println!("{}", summary);

    assert!(results.iter().all(|r| r.passed), "{}", summary);
    let stale: u64 = results.iter().map(|r| r.store_stats.stale_positions).sum();
    assert!(stale > 0);
}

#[tokio::test]
async fn test_shipper_dst_lost_responses_only() {
    let config = ShipperDSTConfig {
        max_attempts: 2,
        store: SimulatedStoreConfig {
            timeout_after_apply_prob: 0.3,
            head_fail_prob: 0.2,
            ..SimulatedStoreConfig::no_faults()
        },
        ..ShipperDSTConfig::baseline()
    };
    let results = run_dst_batch(40_000, 20, config).await;
    let summary = summarize_batch(&results);
    println!("{}", summary);

    assert!(results.iter().all(|r| r.passed), "{}", summary);
    let lost: u64 = results.iter().map(|r| r.store_stats.lost_acks).sum();
    assert!(lost > 0);
}

#[tokio::test]
#[ignore] // Run with: cargo test --test shipper_dst_test -- --ignored --nocapture
async fn test_shipper_dst_stress_1000_seeds() {
    let results = run_dst_batch(100_000, 1000, ShipperDSTConfig::chaos()).await;
    let summary = summarize_batch(&results);
    println!("{}", summary);

    assert!(results.iter().all(|r| r.passed), "{}", summary);
}
