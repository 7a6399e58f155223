//! Rolling log shipper for append-only object storage
//!
//! Application log records are buffered in memory and shipped in batches to
//! segment objects named `{base}/{job}/{host}_{ip}/{prefix}_{date}_{index}.log`.
//! See [`shipper`] for the pipeline and [`observability`] for wiring it into
//! a `tracing` subscriber.

pub mod buggify;
pub mod io;
pub mod observability;
pub mod shipper;

#[cfg(test)]
mod stateright;

pub use shipper::{
    spawn_shipper, AppendObjectStore, ShipperConfig, ShipperError, ShipperHandle,
    ShipperMakeWriter, ShipperStats,
};
