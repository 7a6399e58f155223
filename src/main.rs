//! Rolling Log Shipper
//!
//! Reads log lines from stdin and ships them to append-only object storage.
//!
//! ```bash
//! my-app 2>&1 | rolling-shipper --config shipper.toml
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | SHIPPER_CONFIG | - | TOML config file (same as `--config`) |
//! | SHIPPER_STORE_TYPE | local_fs | in_memory, local_fs, or s3 |
//! | SHIPPER_LOCAL_PATH | shipped-logs | LocalFs root directory |
//! | SHIPPER_BUCKET | - | Bucket name (s3) |
//! | SHIPPER_BASE_PATH | logs | Leading key path |
//! | SHIPPER_JOB_NAME | default-job | Job name (falls back to FLINK_JOB_NAME) |
//! | SHIPPER_PREFIX | app | Segment file prefix |
//! | SHIPPER_MAX_SEGMENT_SIZE | 10485760 | Rotation threshold in bytes |
//! | SHIPPER_RETENTION_LIMIT | 10 | Segments kept |
//! | SHIPPER_FLUSH_MAX_LINES | 100 | Line-count flush trigger |
//! | SHIPPER_FLUSH_INTERVAL_MS | 20000 | Time flush trigger |
//! | SHIPPER_LOG_LEVEL | info | Console log filter |
//! | SHIPPER_LOG_FORMAT | text | text or json |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use rolling_shipper::observability::{init_tracing, LogSettings};
use rolling_shipper::shipper::{
    spawn_shipper, AppendObjectStore, EnvSource, InMemoryAppendStore, LocalFsAppendStore,
    ProductionClock, ShipperConfig, StdEnv, StoreType,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let env = StdEnv;
    init_tracing(&LogSettings::from_env(&env), None);

    let config_path = config_path(std::env::args().skip(1), &env)?;
    let config = ShipperConfig::load(config_path.as_deref(), &env).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(
        store = ?config.store_type,
        job = %config.job_name,
        max_segment_size = config.max_segment_size,
        retention = config.retention_limit,
        "Starting rolling shipper"
    );

    match config.store_type {
        StoreType::InMemory => {
            warn!("in_memory store selected, shipped lines are discarded on exit");
            run(&config, InMemoryAppendStore::new()).await
        }
        StoreType::LocalFs => {
            let path = config
                .local_path
                .clone()
                .ok_or("local_path is required for the local_fs store")?;
            run(&config, LocalFsAppendStore::new(path)).await
        }
        #[cfg(feature = "s3")]
        StoreType::S3 => {
            let s3 = config.s3.clone().unwrap_or_default();
            let store = rolling_shipper::shipper::S3AppendStore::new(&config.bucket, &s3)
                .map_err(rolling_shipper::ShipperError::Store)?;
            run(&config, store).await
        }
    }
}

/// `--config <path>` wins over `SHIPPER_CONFIG`
fn config_path<E: EnvSource>(
    mut args: impl Iterator<Item = String>,
    env: &E,
) -> Result<Option<PathBuf>, BoxError> {
    let Some(arg) = args.next() else {
        return Ok(env.get("CONFIG").map(PathBuf::from));
    };
    let path = match arg.as_str() {
        "--config" | "-c" => args.next().ok_or("--config needs a path")?,
        other => match other.strip_prefix("--config=") {
            Some(path) => path.to_string(),
            None => return Err(format!("unknown argument '{}'", other).into()),
        },
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument '{}'", extra).into());
    }
    Ok(Some(PathBuf::from(path)))
}

async fn run<S: AppendObjectStore>(config: &ShipperConfig, store: S) -> Result<(), BoxError> {
    let (handle, task) = spawn_shipper(config, store, ProductionClock::new()).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle.ship(line),
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let stats = handle.stats().await?;
    let flushed = handle.shutdown().await;
    task.await?;

    info!(
        stats = %serde_json::to_string(&stats)?,
        "Shipper stopped"
    );
    match flushed {
        Ok(lines) => {
            info!(lines, "Final flush complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Final flush failed, buffered lines lost");
            Err(e.into())
        }
    }
}
