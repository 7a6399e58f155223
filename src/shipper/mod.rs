//! Rolling Log Shipper
//!
//! Buffers rendered log lines in memory and appends them in batches to
//! segment objects on an append-only object store. Segments rotate on size
//! or when the backend refuses further appends, and only the newest
//! `retention_limit` segments are kept.
//!
//! ## Architecture
//!
//! ```text
//! ShipperHandle::ship ──► ShipperActor ──► LineBuffer ──► SegmentRotator ──► AppendObjectStore
//!                              ▲                               │
//!                              └── tick (interval flush)       └── RotationLedger (retention)
//! ```
//!
//! ## Key Features
//!
//! - **Positional appends**: every append names the offset it expects
//! - **Self-healing**: stale positions resync from object metadata
//! - **Restart resume**: today's newest segment is adopted on open
//! - **Non-blocking producers**: backend errors never reach the caller

pub mod actor;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod core;
pub mod dst;
pub mod error;
pub mod ledger;
pub mod make_writer;
pub mod object_store;
pub mod rotator;
#[cfg(feature = "s3")]
pub mod s3_store;
pub mod segment;
pub mod simulated_store;

pub use actor::{spawn_shipper, ShipperActor, ShipperHandle, ShipperMessage};
pub use buffer::LineBuffer;
pub use clock::{ProductionClock, ShipperClock, SimulatedClock, Timestamp};
pub use config::{
    AppendConfig, BufferConfig, ConfigError, EnvSource, FlushConfig, OverflowPolicy,
    ShipperConfig, StdEnv, StoreType,
};
#[cfg(feature = "s3")]
pub use config::S3Config;
pub use core::{ShipperCore, ShipperStats};
pub use dst::{
    run_dst_batch, summarize_batch, ShipperDSTConfig, ShipperDSTHarness, ShipperDSTResult,
};
pub use error::{ShipperError, ShipperResult};
pub use ledger::RotationLedger;
pub use make_writer::ShipperMakeWriter;
pub use object_store::{
    AppendObjectStore, InMemoryAppendStore, LocalFsAppendStore, ObjectMeta, ObjectStoreError,
};
pub use rotator::{RotationReason, RotatorStats, SegmentRotator};
#[cfg(feature = "s3")]
pub use s3_store::S3AppendStore;
pub use segment::{RemoteSegment, SegmentNamer};
pub use simulated_store::{SimulatedAppendStore, SimulatedStoreConfig, SimulatedStoreStats};
