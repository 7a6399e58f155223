//! Tracing setup
//!
//! A console layer for the process's own diagnostics, plus an optional layer
//! that ships rendered application records through a [`ShipperHandle`].
//! Records emitted by this crate never reach the shipping layer, so the
//! shipper cannot feed its own diagnostics back into itself.

use crate::shipper::config::EnvSource;
use crate::shipper::{ShipperHandle, ShipperMakeWriter};
use serde::{Deserialize, Serialize};

/// Target prefix of every record emitted by this crate
pub const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Console logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `rolling_shipper=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogSettings {
    /// Defaults overridden by `SHIPPER_LOG_LEVEL` / `SHIPPER_LOG_FORMAT`
    pub fn from_env<E: EnvSource>(env: &E) -> Self {
        let mut settings = LogSettings::default();
        if let Some(level) = env.get("LOG_LEVEL") {
            settings.level = level;
        }
        if let Some(format) = env.get("LOG_FORMAT") {
            settings.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
        settings
    }
}

/// Install the global subscriber. Idempotent: a second call is ignored.
pub fn init_tracing(settings: &LogSettings, shipper: Option<ShipperHandle>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console = match settings.format {
        LogFormat::Json => fmt::layer().with_writer(std::io::stderr).json().boxed(),
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    let shipping = shipper.map(|handle| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(ShipperMakeWriter::new(handle))
            .with_filter(shipping_filter())
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(shipping)
        .try_init();
}

/// Everything except this crate's own records
fn shipping_filter() -> tracing_subscriber::filter::Targets {
    use tracing_subscriber::filter::{LevelFilter, Targets};

    Targets::new()
        .with_target(SELF_TARGET, LevelFilter::OFF)
        .with_default(LevelFilter::TRACE)
}
