//! Object storage abstraction consumed by the sync engine and the HTTP handlers.

mod memory;
mod s3;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::{StorageBackend, StorageSettings};

pub use memory::MemoryStore;
pub use s3::S3Store;

/// User metadata key holding the hex SHA-256 digest of an uploaded file.
pub const DIGEST_METADATA_KEY: &str = "sha256";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store `{operation}` failed for `{key}`: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },
    #[error("object store is misconfigured: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn backend(operation: &'static str, key: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Metadata written alongside an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub user: HashMap<String, String>,
}

/// Result of a successful `stat_object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub modified_at: Option<OffsetDateTime>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub user: HashMap<String, String>,
}

impl ObjectStat {
    pub fn digest(&self) -> Option<&str> {
        self.user.get(DIGEST_METADATA_KEY).map(String::as_str)
    }
}

/// One entry of a recursive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub modified_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human-readable backend location used in logs.
    fn describe(&self) -> String;

    /// Verify the backend is reachable before serving traffic.
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError>;

    /// Upload everything `reader` yields from its current position.
    ///
    /// The default buffers the body and delegates to `put_object`; backends
    /// that can write in parts override it.
    async fn put_reader(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|err| StorageError::backend("put", key, err.to_string()))?;
        self.put_object(key, Bytes::from(buffer), metadata).await
    }

    /// Returns `Ok(None)` when the object does not exist.
    async fn stat_object(&self, key: &str) -> Result<Option<ObjectStat>, StorageError>;

    /// Recursively list every object whose key starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;

    async fn remove_object(&self, key: &str) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StorageError>;

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Build the configured backend.
pub fn build_store(settings: &StorageSettings) -> Result<Arc<dyn RemoteStore>, StorageError> {
    match settings.backend {
        StorageBackend::S3 => Ok(Arc::new(S3Store::new(settings)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
