//! S3 Append Store
//!
//! S3 has no native append, so `append_at` is a conditional read-modify-write:
//! fetch the object and its ETag, check the requested position against the
//! current length, then write the concatenation with `PutMode::Update` (or
//! `PutMode::Create` for a new object). A lost race surfaces as a position
//! mismatch, which the shipper heals through resync.
//!
//! Supports:
//! - AWS S3
//! - S3-compatible services (MinIO, LocalStack, etc.)
//! - Custom endpoints

use super::config::S3Config;
use super::object_store::{AppendObjectStore, ObjectMeta, ObjectStoreError, StoreFuture};
use futures::TryStreamExt;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore as ObjectStoreTrait, PutMode, PutOptions, UpdateVersion};
use std::sync::Arc;

/// S3-backed append store for production deployments
#[derive(Clone)]
pub struct S3AppendStore {
    store: Arc<dyn ObjectStoreTrait>,
}

impl S3AppendStore {
    /// Create a new S3 append store
    ///
    /// Credentials come from the standard AWS environment variables
    /// (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN).
    pub fn new(bucket: &str, config: &S3Config) -> Result<Self, ObjectStoreError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&config.region)
            .with_conditional_put(S3ConditionalPut::ETagMatch);

        // Use custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| ObjectStoreError::Other(format!("failed to create S3 store: {}", e)))?;

        Ok(S3AppendStore {
            store: Arc::new(store),
        })
    }

    /// Create from an existing object store (for testing)
    pub fn from_store(store: Arc<dyn ObjectStoreTrait>) -> Self {
        S3AppendStore { store }
    }

    fn map_error(err: object_store::Error) -> ObjectStoreError {
        match err {
            object_store::Error::NotFound { path, .. } => ObjectStoreError::NotFound(path),
            other => ObjectStoreError::Other(other.to_string()),
        }
    }

    async fn append_inner(
        &self,
        key: &str,
        data: &[u8],
        position: u64,
    ) -> Result<u64, ObjectStoreError> {
        let path = ObjectPath::from(key);

        let (mut contents, mode) = match self.store.get(&path).await {
            Ok(result) => {
                let version = UpdateVersion {
                    e_tag: result.meta.e_tag.clone(),
                    version: result.meta.version.clone(),
                };
                let existing = result.bytes().await.map_err(Self::map_error)?;
                (existing.to_vec(), PutMode::Update(version))
            }
            Err(object_store::Error::NotFound { .. }) => (Vec::new(), PutMode::Create),
            Err(e) => return Err(Self::map_error(e)),
        };

        let actual = contents.len() as u64;
        if actual != position {
            return Err(ObjectStoreError::PositionMismatch {
                key: key.to_string(),
                requested: position,
                actual: Some(actual),
            });
        }

        contents.extend_from_slice(data);
        let next_position = contents.len() as u64;

        match self
            .store
            .put_opts(&path, bytes::Bytes::from(contents).into(), PutOptions::from(mode))
            .await
        {
            Ok(_) => Ok(next_position),
            // Someone else changed the object between read and write
            Err(object_store::Error::Precondition { .. })
            | Err(object_store::Error::AlreadyExists { .. }) => {
                Err(ObjectStoreError::PositionMismatch {
                    key: key.to_string(),
                    requested: position,
                    actual: None,
                })
            }
            Err(e) => Err(Self::map_error(e)),
        }
    }
}

impl std::fmt::Debug for S3AppendStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3AppendStore")
            .field("store", &self.store.to_string())
            .finish()
    }
}

impl AppendObjectStore for S3AppendStore {
    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        position: u64,
    ) -> StoreFuture<'a, u64> {
        Box::pin(self.append_inner(key, data, position))
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let meta = self
                .store
                .head(&ObjectPath::from(key))
                .await
                .map_err(Self::map_error)?;

            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: meta.size as u64,
                next_position: meta.size as u64,
                append_count: None,
            })
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            match self.store.head(&ObjectPath::from(key)).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            // S3 delete is idempotent - ignore not found errors
            match self.store.delete(&ObjectPath::from(key)).await {
                Ok(()) => Ok(()),
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let result = self
                .store
                .get(&ObjectPath::from(key))
                .await
                .map_err(Self::map_error)?;
            let data = result.bytes().await.map_err(Self::map_error)?;
            Ok(data.to_vec())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            // object_store lists by path segment, so list the directory and
            // match the file-name part by string prefix
            let dir = prefix.rsplit_once('/').map(|(dir, _)| ObjectPath::from(dir));
            let objects: Vec<_> = self
                .store
                .list(dir.as_ref())
                .try_collect()
                .await
                .map_err(Self::map_error)?;

            let mut keys: Vec<String> = objects
                .into_iter()
                .map(|meta| meta.location.to_string())
                .filter(|key| key.starts_with(prefix))
                .collect();
            keys.sort();
            Ok(keys)
        })
    }
}
