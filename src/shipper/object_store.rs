//! Append-Only Object Store Abstraction
//!
//! The shipper needs five things from a backend: append at a
//! server-confirmed position, fetch metadata, probe existence, delete, and
//! list keys under a prefix (startup resume). `get` is included for
//! verification and tooling.
//!
//! Implementations:
//! - `InMemoryAppendStore`: For unit tests and DST (emulates the append ceiling)
//! - `LocalFsAppendStore`: For development and local testing
//! - `S3AppendStore`: For production (feature-gated, see `s3_store`)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Appends a single object accepts before the backend refuses further appends
/// (observed limit of append-capable object stores).
pub const DEFAULT_APPEND_LIMIT: u32 = 10_000;

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key (path)
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Offset at which the next append must be issued
    pub next_position: u64,
    /// Number of appends applied so far, when the backend reports it
    pub append_count: Option<u32>,
}

/// Error type for object store operations
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Object not found
    #[error("object not found: {0}")]
    NotFound(String),
    /// Append issued at a position other than the object's current end
    #[error("append position mismatch for {key}: requested {requested}, object at {actual:?}")]
    PositionMismatch {
        key: String,
        requested: u64,
        actual: Option<u64>,
    },
    /// Backend refuses further appends to this object
    #[error("append limit of {limit} reached for {key}")]
    AppendLimitReached { key: String, limit: u32 },
    /// Request timed out; the operation may or may not have been applied
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Backend rejected the request without applying it (throttling, 5xx)
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// Permission denied
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[source] IoError),
    /// Other errors
    #[error("object store error: {0}")]
    Other(String),
}

impl ObjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound(_))
    }

    pub fn is_append_limit(&self) -> bool {
        matches!(self, ObjectStoreError::AppendLimitReached { .. })
    }

    /// True when a failed write may still have been applied by the backend
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::Timeout(_) | ObjectStoreError::Io(_) | ObjectStoreError::Other(_)
        )
    }
}

impl From<IoError> for ObjectStoreError {
    fn from(e: IoError) -> Self {
        match e.kind() {
            ErrorKind::NotFound => ObjectStoreError::NotFound(e.to_string()),
            ErrorKind::PermissionDenied => ObjectStoreError::PermissionDenied(e.to_string()),
            ErrorKind::TimedOut => ObjectStoreError::Timeout(e.to_string()),
            _ => ObjectStoreError::Io(e),
        }
    }
}

pub type StoreResult<T> = Result<T, ObjectStoreError>;

/// Boxed future returned by store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Append-capable object store
pub trait AppendObjectStore: Send + Sync + 'static {
    /// Append `data` at `position`; returns the next append position.
    ///
    /// A missing object is created by an append at position 0.
    fn append_at<'a>(&'a self, key: &'a str, data: &'a [u8], position: u64)
        -> StoreFuture<'a, u64>;

    /// Get object metadata without downloading content
    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta>;

    /// Check if an object exists
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Delete an object (deleting a missing object is not an error)
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// Get an object's contents
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Keys starting with `prefix`, sorted
    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}

impl<T: AppendObjectStore> AppendObjectStore for Arc<T> {
    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        position: u64,
    ) -> StoreFuture<'a, u64> {
        (**self).append_at(key, data, position)
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        (**self).head(key)
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        (**self).exists(key)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        (**self).delete(key)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        (**self).get(key)
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        (**self).list(prefix)
    }
}

// ============================================================================
// InMemoryAppendStore - For tests and DST
// ============================================================================

#[derive(Debug, Clone, Default)]
struct StoredObject {
    data: Vec<u8>,
    append_count: u32,
}

/// In-memory append store for unit tests and deterministic simulation
#[derive(Debug, Clone)]
pub struct InMemoryAppendStore {
    data: Arc<RwLock<HashMap<String, StoredObject>>>,
    append_limit: u32,
    append_calls: Arc<AtomicU64>,
}

impl InMemoryAppendStore {
    /// Create a new in-memory store with the default append ceiling
    pub fn new() -> Self {
        Self::with_append_limit(DEFAULT_APPEND_LIMIT)
    }

    /// Create a store that refuses appends after `limit` appends per object
    pub fn with_append_limit(limit: u32) -> Self {
        debug_assert!(limit > 0, "Precondition: append limit must be positive");
        InMemoryAppendStore {
            data: Arc::new(RwLock::new(HashMap::new())),
            append_limit: limit,
            append_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the number of stored objects
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Contents of an object, if present
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).map(|obj| obj.data.clone())
    }

    /// Total number of `append_at` calls received, successful or not
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn append_sync(&self, key: &str, data: &[u8], position: u64) -> StoreResult<u64> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        let mut objects = self.data.write();
        match objects.get_mut(key) {
            Some(obj) => {
                if obj.append_count >= self.append_limit {
                    return Err(ObjectStoreError::AppendLimitReached {
                        key: key.to_string(),
                        limit: self.append_limit,
                    });
                }
                let actual = obj.data.len() as u64;
                if actual != position {
                    return Err(ObjectStoreError::PositionMismatch {
                        key: key.to_string(),
                        requested: position,
                        actual: Some(actual),
                    });
                }
                obj.data.extend_from_slice(data);
                obj.append_count += 1;
                Ok(obj.data.len() as u64)
            }
            None => {
                if position != 0 {
                    return Err(ObjectStoreError::PositionMismatch {
                        key: key.to_string(),
                        requested: position,
                        actual: None,
                    });
                }
                objects.insert(
                    key.to_string(),
                    StoredObject {
                        data: data.to_vec(),
                        append_count: 1,
                    },
                );
                Ok(data.len() as u64)
            }
        }
    }
}

impl Default for InMemoryAppendStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppendObjectStore for InMemoryAppendStore {
    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        position: u64,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move { self.append_sync(key, data, position) })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| ObjectMeta {
                    key: key.to_string(),
                    size_bytes: obj.data.len() as u64,
                    next_position: obj.data.len() as u64,
                    append_count: Some(obj.append_count),
                })
                .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.data.read().contains_key(key)) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.data.write().remove(key);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.object(key)
                .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut keys: Vec<String> = self
                .data
                .read()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
    }
}

// ============================================================================
// LocalFsAppendStore - For development
// ============================================================================

/// Local filesystem append store; each key is a file under `base_path`
#[derive(Debug, Clone)]
pub struct LocalFsAppendStore {
    base_path: PathBuf,
}

impl LocalFsAppendStore {
    /// Create a new local filesystem store
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalFsAppendStore {
            base_path: base_path.into(),
        }
    }

    /// Get the full path for a key
    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Ensure parent directories exist
    async fn ensure_parent(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Current file length, 0 when the file does not exist yet
    async fn current_len(path: &Path) -> std::io::Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl AppendObjectStore for LocalFsAppendStore {
    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        position: u64,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let path = self.full_path(key);
            let current = Self::current_len(&path).await?;
            if current.unwrap_or(0) != position {
                return Err(ObjectStoreError::PositionMismatch {
                    key: key.to_string(),
                    requested: position,
                    actual: current,
                });
            }

            self.ensure_parent(&path).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(data).await?;
            file.sync_data().await?;

            Ok(position + data.len() as u64)
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let metadata = tokio::fs::metadata(self.full_path(key)).await?;
            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: metadata.len(),
                next_position: metadata.len(),
                append_count: None,
            })
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(tokio::fs::try_exists(self.full_path(key)).await?) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.full_path(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already deleted
                Err(e) => Err(e.into()),
            }
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move { Ok(tokio::fs::read(self.full_path(key)).await?) })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            // Segment keys are flat files, so only the prefix's own directory is read
            let (dir, name) = match prefix.rsplit_once('/') {
                Some((dir, name)) => (Some(dir), name),
                None => (None, prefix),
            };
            let search_dir = match dir {
                Some(dir) => self.full_path(dir),
                None => self.base_path.clone(),
            };

            let mut entries = match tokio::fs::read_dir(&search_dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut keys = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if file_name.starts_with(name) {
                    keys.push(match dir {
                        Some(dir) => format!("{}/{}", dir, file_name),
                        None => file_name,
                    });
                }
            }
            keys.sort();
            Ok(keys)
        })
    }
}
