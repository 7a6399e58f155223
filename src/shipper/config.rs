//! Configuration for the Log Shipper
//!
//! Layering, lowest to highest priority: built-in defaults, TOML file,
//! `SHIPPER_*` environment variables. The result is validated once and is
//! immutable afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SHIPPER_";

/// Job name used when none is configured
pub const DEFAULT_JOB_NAME: &str = "default-job";

/// Raw (unprefixed) variable consulted for the job name when nothing else sets it
pub const JOB_NAME_ENV_FALLBACK: &str = "FLINK_JOB_NAME";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse SHIPPER_{var}: {reason}")]
    Env { var: String, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main shipper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Object store backend
    pub store_type: StoreType,
    /// Root directory (for LocalFs store)
    pub local_path: Option<PathBuf>,
    /// Bucket name (for S3 store)
    pub bucket: String,
    /// Leading path of every segment key
    pub base_path: String,
    /// Job name path component
    pub job_name: String,
    /// Hostname override (auto-detected when unset)
    pub host: Option<String>,
    /// IP override (auto-detected when unset)
    pub ip: Option<String>,
    /// Segment file name prefix
    pub prefix: String,
    /// Rotate once the active segment holds at least this many bytes
    pub max_segment_size: u64,
    /// Number of segments kept, including the active one
    pub retention_limit: usize,
    /// Flush triggers
    pub flush: FlushConfig,
    /// Buffer bounds
    pub buffer: BufferConfig,
    /// Append retry budget
    pub append: AppendConfig,
    /// S3 configuration (for S3 store)
    #[cfg(feature = "s3")]
    pub s3: Option<S3Config>,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        ShipperConfig {
            store_type: StoreType::LocalFs,
            local_path: Some(PathBuf::from("shipped-logs")),
            bucket: String::new(),
            base_path: "logs".to_string(),
            job_name: DEFAULT_JOB_NAME.to_string(),
            host: None,
            ip: None,
            prefix: "app".to_string(),
            max_segment_size: 10 * 1024 * 1024, // 10MB
            retention_limit: 10,
            flush: FlushConfig::default(),
            buffer: BufferConfig::default(),
            append: AppendConfig::default(),
            #[cfg(feature = "s3")]
            s3: None,
        }
    }
}

impl ShipperConfig {
    /// Create config for testing (in-memory, small segments, fixed identity)
    pub fn test() -> Self {
        ShipperConfig {
            store_type: StoreType::InMemory,
            local_path: None,
            bucket: String::new(),
            base_path: "logs".to_string(),
            job_name: "test-job".to_string(),
            host: Some("test-host".to_string()),
            ip: Some("127.0.0.1".to_string()),
            prefix: "app".to_string(),
            max_segment_size: 1024,
            retention_limit: 3,
            flush: FlushConfig::test(),
            buffer: BufferConfig::test(),
            append: AppendConfig::default(),
            #[cfg(feature = "s3")]
            s3: None,
        }
    }

    /// Parse a TOML document (missing fields take defaults)
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults or file, then environment overrides, then validation
    pub fn load<E: EnvSource>(path: Option<&Path>, env: &E) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHIPPER_*` overrides from an environment source
    pub fn apply_env_overrides<E: EnvSource>(&mut self, env: &E) -> Result<(), ConfigError> {
        if let Some(val) = get_env_parsed::<StoreType, E>(env, "STORE_TYPE")? {
            self.store_type = val;
        }
        if let Some(val) = env.get("LOCAL_PATH") {
            self.local_path = Some(PathBuf::from(val));
        }
        if let Some(val) = env.get("BUCKET") {
            self.bucket = val;
        }
        if let Some(val) = env.get("BASE_PATH") {
            self.base_path = val;
        }
        if let Some(val) = env.get("JOB_NAME") {
            self.job_name = val;
        } else if self.job_name == DEFAULT_JOB_NAME {
            if let Some(val) = env.get_raw(JOB_NAME_ENV_FALLBACK) {
                self.job_name = val;
            }
        }
        if let Some(val) = env.get("HOST") {
            self.host = Some(val);
        }
        if let Some(val) = env.get("IP") {
            self.ip = Some(val);
        }
        if let Some(val) = env.get("PREFIX") {
            self.prefix = val;
        }
        if let Some(val) = get_env_parsed(env, "MAX_SEGMENT_SIZE")? {
            self.max_segment_size = val;
        }
        if let Some(val) = get_env_parsed(env, "RETENTION_LIMIT")? {
            self.retention_limit = val;
        }

        // Flush triggers
        if let Some(val) = get_env_parsed(env, "FLUSH_MAX_LINES")? {
            self.flush.max_lines = val;
        }
        if let Some(val) = get_env_parsed(env, "FLUSH_INTERVAL_MS")? {
            self.flush.interval = Duration::from_millis(val);
        }
        if let Some(val) = get_env_parsed(env, "FLUSH_TICK_INTERVAL_MS")? {
            self.flush.tick_interval = Duration::from_millis(val);
        }

        // Buffer bounds
        if let Some(val) = get_env_parsed(env, "MAX_BUFFERED_BYTES")? {
            self.buffer.max_buffered_bytes = val;
        }
        if let Some(val) = get_env_parsed(env, "OVERFLOW_POLICY")? {
            self.buffer.overflow_policy = val;
        }
        if let Some(val) = get_env_parsed(env, "MAX_BATCH_BYTES")? {
            self.buffer.max_batch_bytes = val;
        }

        if let Some(val) = get_env_parsed(env, "APPEND_MAX_ATTEMPTS")? {
            self.append.max_attempts = val;
        }

        #[cfg(feature = "s3")]
        {
            if let Some(region) = env.get("S3_REGION") {
                self.s3.get_or_insert_with(S3Config::default).region = region;
            }
            if let Some(endpoint) = env.get("S3_ENDPOINT") {
                self.s3.get_or_insert_with(S3Config::default).endpoint = Some(endpoint);
            }
        }

        Ok(())
    }

    /// Validate all fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_limit < 1 {
            return invalid("retention_limit must be at least 1");
        }
        if self.max_segment_size == 0 {
            return invalid("max_segment_size must be positive");
        }
        if self.prefix.is_empty() || self.prefix.contains('/') {
            return invalid("prefix must be non-empty and must not contain '/'");
        }
        for (name, value) in [("host", &self.host), ("ip", &self.ip)] {
            if let Some(value) = value {
                if value.is_empty() || value.contains('/') {
                    return invalid(&format!("{} must be non-empty and must not contain '/'", name));
                }
            }
        }
        if self.job_name.contains('/') {
            return invalid("job_name must not contain '/'");
        }
        self.flush.validate()?;
        self.buffer.validate()?;
        self.append.validate()?;

        match self.store_type {
            StoreType::InMemory => {}
            StoreType::LocalFs => {
                if self.local_path.is_none() {
                    return invalid("local_path is required for the local_fs store");
                }
            }
            #[cfg(feature = "s3")]
            StoreType::S3 => {
                if self.bucket.is_empty() {
                    return invalid("bucket is required for the s3 store");
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.to_string()))
}

/// Type of object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (for tests)
    InMemory,
    /// Local filesystem
    LocalFs,
    /// Amazon S3 or compatible
    #[cfg(feature = "s3")]
    S3,
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in_memory" | "memory" => Ok(StoreType::InMemory),
            "local_fs" | "fs" => Ok(StoreType::LocalFs),
            #[cfg(feature = "s3")]
            "s3" => Ok(StoreType::S3),
            other => Err(format!("unknown store type '{}'", other)),
        }
    }
}

/// S3 configuration
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// AWS region
    pub region: String,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
}

#[cfg(feature = "s3")]
impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

/// Flush trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Flush once this many lines are pending (default: 100)
    pub max_lines: usize,
    /// Flush once this long has passed since the last flush (default: 20s)
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    /// Period of the timer that drives interval flushes for idle producers
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        FlushConfig {
            max_lines: 100,
            interval: Duration::from_secs(20),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl FlushConfig {
    /// Configuration for tests (small batches, fast ticks)
    pub fn test() -> Self {
        FlushConfig {
            max_lines: 10,
            interval: Duration::from_millis(200),
            tick_interval: Duration::from_millis(10),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lines < 1 {
            return invalid("flush.max_lines must be at least 1");
        }
        if self.interval.is_zero() {
            return invalid("flush.interval must be positive");
        }
        if self.tick_interval.is_zero() {
            return invalid("flush.tick_interval must be positive");
        }
        Ok(())
    }
}

/// What to do with a line that would push the buffer past its byte bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending lines to make room
    DropOldest,
    /// Reject the incoming line
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown overflow policy '{}'", other)),
        }
    }
}

/// Buffer bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Upper bound on pending bytes (default: 64MB)
    pub max_buffered_bytes: usize,
    /// Policy applied when the bound would be exceeded
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on a single append payload (default: 4MB)
    pub max_batch_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            max_buffered_bytes: 64 * 1024 * 1024,
            overflow_policy: OverflowPolicy::DropOldest,
            max_batch_bytes: 4 * 1024 * 1024,
        }
    }
}

impl BufferConfig {
    /// Configuration for tests (small bounds)
    pub fn test() -> Self {
        BufferConfig {
            max_buffered_bytes: 1024 * 1024,
            overflow_policy: OverflowPolicy::DropOldest,
            max_batch_bytes: 64 * 1024,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_bytes == 0 {
            return invalid("buffer.max_batch_bytes must be positive");
        }
        if self.max_buffered_bytes == 0 {
            return invalid("buffer.max_buffered_bytes must be positive");
        }
        Ok(())
    }
}

/// Append retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendConfig {
    /// Total append attempts per payload, including the first (default: 10)
    pub max_attempts: u32,
}

impl Default for AppendConfig {
    fn default() -> Self {
        AppendConfig { max_attempts: 10 }
    }
}

impl AppendConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return invalid("append.max_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Abstraction over environment-variable lookups so tests can supply
/// overrides without touching the process environment.
pub trait EnvSource {
    /// Get a variable by its name without the `SHIPPER_` prefix
    fn get(&self, key: &str) -> Option<String>;

    /// Get a variable by its full, unprefixed name
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnv;

impl EnvSource for StdEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

fn get_env_parsed<T, E>(env: &E, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: EnvSource,
{
    match env.get(key) {
        Some(val) => val.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Env {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(None),
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapEnv(HashMap<String, String>);

    impl MapEnv {
        fn with(mut self, key: &str, value: &str) -> Self {
            self.0.insert(key.to_string(), value.to_string());
            self
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(&format!("{}{}", ENV_PREFIX, key)).cloned()
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ShipperConfig::default();
        config.validate().unwrap();
        assert_eq!(config.flush.max_lines, 100);
        assert_eq!(config.flush.interval, Duration::from_secs(20));
        assert_eq!(config.append.max_attempts, 10);
        ShipperConfig::test().validate().unwrap();
    }

    #[test]
    fn test_toml_partial_document() {
        let config = ShipperConfig::from_toml_str(
            r#"
            store_type = "in_memory"
            prefix = "svc"
            retention_limit = 5

            [flush]
            max_lines = 50
            interval = 1500

            [buffer]
            overflow_policy = "drop_newest"
            "#,
        )
        .unwrap();

        assert_eq!(config.store_type, StoreType::InMemory);
        assert_eq!(config.prefix, "svc");
        assert_eq!(config.retention_limit, 5);
        assert_eq!(config.flush.max_lines, 50);
        assert_eq!(config.flush.interval, Duration::from_millis(1500));
        assert_eq!(config.flush.tick_interval, Duration::from_secs(1));
        assert_eq!(config.buffer.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.max_segment_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_env_overrides() {
        let env = MapEnv::default()
            .with("SHIPPER_STORE_TYPE", "in_memory")
            .with("SHIPPER_PREFIX", "worker")
            .with("SHIPPER_MAX_SEGMENT_SIZE", "4096")
            .with("SHIPPER_FLUSH_INTERVAL_MS", "250")
            .with("SHIPPER_OVERFLOW_POLICY", "drop_newest")
            .with("SHIPPER_HOST", "node-7");

        let mut config = ShipperConfig::default();
        config.apply_env_overrides(&env).unwrap();

        assert_eq!(config.store_type, StoreType::InMemory);
        assert_eq!(config.prefix, "worker");
        assert_eq!(config.max_segment_size, 4096);
        assert_eq!(config.flush.interval, Duration::from_millis(250));
        assert_eq!(config.buffer.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.host.as_deref(), Some("node-7"));
    }

    #[test]
    fn test_env_parse_error_names_variable() {
        let env = MapEnv::default().with("SHIPPER_RETENTION_LIMIT", "many");
        let err = ShipperConfig::default()
            .apply_env_overrides(&env)
            .unwrap_err();
        assert!(err.to_string().contains("SHIPPER_RETENTION_LIMIT"));
    }

    #[test]
    fn test_job_name_fallback() {
        let env = MapEnv::default().with("FLINK_JOB_NAME", "etl");
        let mut config = ShipperConfig::default();
        config.apply_env_overrides(&env).unwrap();
        assert_eq!(config.job_name, "etl");

        let env = env.with("SHIPPER_JOB_NAME", "explicit");
        let mut config = ShipperConfig::default();
        config.apply_env_overrides(&env).unwrap();
        assert_eq!(config.job_name, "explicit");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: [fn(&mut ShipperConfig); 9] = [
            |c| c.retention_limit = 0,
            |c| c.max_segment_size = 0,
            |c| c.prefix = String::new(),
            |c| c.prefix = "a/b".to_string(),
            |c| c.flush.max_lines = 0,
            |c| c.flush.interval = Duration::ZERO,
            |c| c.append.max_attempts = 0,
            |c| c.buffer.max_batch_bytes = 0,
            |c| {
                c.store_type = StoreType::LocalFs;
                c.local_path = None;
            },
        ];

        for mutate in cases {
            let mut config = ShipperConfig::test();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "expected invalid: {:?}",
                config
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipper.toml");
        std::fs::write(&path, "store_type = \"in_memory\"\nretention_limit = 0\n").unwrap();

        let err = ShipperConfig::load(Some(&path), &MapEnv::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let env = MapEnv::default().with("SHIPPER_RETENTION_LIMIT", "2");
        let config = ShipperConfig::load(Some(&path), &env).unwrap();
        assert_eq!(config.retention_limit, 2);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ShipperConfig::load(Some(&missing), &MapEnv::default()),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = ShipperConfig::test();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ShipperConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.flush.interval, config.flush.interval);
        assert_eq!(parsed.buffer.overflow_policy, config.buffer.overflow_policy);
    }
}
