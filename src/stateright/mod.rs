//! Stateright Model Checking
//!
//! Exhaustive state-space exploration of the rotation protocol, next to the
//! seeded simulation runs in `shipper::dst`.
//!
//! ## Available Models
//!
//! - `rotation`: positional appends, resync, append ceiling, retention and
//!   restart resume
//!
//! ## Running Model Checks
//!
//! ```bash
//! # The full-size check is marked #[ignore] for CI speed
//! cargo test stateright_rotation -- --ignored --nocapture
//! ```

pub mod rotation;

pub use rotation::{RotationModel, RotationModelConfig};
