//! Shipper errors

use super::config::ConfigError;
use super::object_store::ObjectStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A backend probe at startup failed; the shipper does not start
    #[error("startup probe of {key} failed: {source}")]
    Probe {
        key: String,
        #[source]
        source: ObjectStoreError,
    },

    /// Every permitted append attempt failed; the payload was not appended
    #[error("append to {key} failed after {attempts} attempts: {source}")]
    AppendExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: ObjectStoreError,
    },

    /// Building the configured store failed
    #[error("store initialization failed: {0}")]
    Store(#[source] ObjectStoreError),

    /// The actor task has exited
    #[error("shipper is no longer running")]
    Closed,
}

pub type ShipperResult<T> = Result<T, ShipperError>;
