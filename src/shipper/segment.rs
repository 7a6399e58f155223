//! Segment naming and the active remote segment
//!
//! Key layout: `{base_path}/{job}/{host}_{ip}/{prefix}_{date}_{index}.log`

use super::config::ShipperConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Host identity used when detection fails
const FALLBACK_HOST: &str = "localhost";

/// Builds segment keys for one shipper instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNamer {
    directory: String,
    prefix: String,
}

impl SegmentNamer {
    pub fn new(base_path: &str, job_name: &str, host: &str, ip: &str, prefix: &str) -> Self {
        let host_dir = format!("{}_{}", host, ip);
        let directory = [base_path.trim_matches('/'), job_name, host_dir.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");

        SegmentNamer {
            directory,
            prefix: prefix.to_string(),
        }
    }

    /// Namer for a validated config, detecting host and IP where not overridden
    pub async fn from_config(config: &ShipperConfig) -> Self {
        let host = config.host.clone().unwrap_or_else(detect_hostname);
        let ip = match &config.ip {
            Some(ip) => ip.clone(),
            None => detect_ip(&host).await.to_string(),
        };
        Self::new(
            &config.base_path,
            &config.job_name,
            &host,
            &ip,
            &config.prefix,
        )
    }

    /// Directory shared by every segment of this instance
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Full key of the segment with the given date stamp and index
    pub fn key(&self, date: &str, index: u64) -> String {
        format!("{}{}.log", self.day_prefix(date), index)
    }

    /// Common prefix of every key for `date`, up to the index
    pub fn day_prefix(&self, date: &str) -> String {
        format!("{}/{}_{}_", self.directory, self.prefix, date)
    }

    /// Index of a key produced by `key(date, _)`, or None for foreign keys
    pub fn index_of(&self, date: &str, key: &str) -> Option<u64> {
        let digits = key
            .strip_prefix(self.day_prefix(date).as_str())?
            .strip_suffix(".log")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// Local hostname, or `localhost` when it cannot be read
pub fn detect_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOST.to_string())
}

/// First IPv4 address the hostname resolves to, else loopback
pub async fn detect_ip(host: &str) -> IpAddr {
    tokio::net::lookup_host((host, 0))
        .await
        .ok()
        .and_then(|mut addrs| addrs.find(SocketAddr::is_ipv4))
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// The remote object currently receiving appends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSegment {
    /// Object key
    pub key: String,
    /// Rotation index encoded in the key
    pub index: u64,
    /// Bytes written so far as tracked locally
    pub size: u64,
    /// Next append offset last confirmed by the backend
    pub position: u64,
}

impl RemoteSegment {
    /// A segment with nothing written yet
    pub fn empty(key: String, index: u64) -> Self {
        RemoteSegment {
            key,
            index,
            size: 0,
            position: 0,
        }
    }

    /// Record a confirmed append
    pub fn advance(&mut self, appended: u64, next_position: u64) {
        self.size += appended;
        self.position = next_position;
    }

    /// Adopt the backend's view after a resync
    pub fn adopt(&mut self, size: u64, next_position: u64) {
        self.size = size;
        self.position = next_position;
    }

    pub fn is_full(&self, max_segment_size: u64) -> bool {
        self.size >= max_segment_size
    }
}
