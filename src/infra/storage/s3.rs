use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{ErrorKind, Metadata, Operator, layers::TimeoutLayer, services::S3};
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::config::StorageSettings;

use super::{ObjectInfo, ObjectMetadata, ObjectStat, RemoteStore, StorageError, StoredObject};

/// Timeout for metadata operations (stat, delete, list pages).
const OP_TIMEOUT_SECS: u64 = 60;
/// Timeout for a single body read or write.
const IO_TIMEOUT_SECS: u64 = 300;
/// Part size for streamed uploads; larger bodies go up as multipart.
const UPLOAD_CHUNK_BYTES: usize = 8 * 1024 * 1024;
/// Read size when draining a local reader into the writer.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// S3-compatible backend built on an opendal operator.
pub struct S3Store {
    operator: Operator,
    name: String,
}

impl S3Store {
    pub fn new(settings: &StorageSettings) -> Result<Self, StorageError> {
        if settings.bucket.is_empty() {
            return Err(StorageError::Configuration(
                "storage.bucket must be set for the s3 backend".to_string(),
            ));
        }

        let mut builder = S3::default()
            .bucket(&settings.bucket)
            .region(&settings.region);

        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.endpoint(endpoint);
        }
        if let Some(access_key) = settings.access_key.as_deref() {
            builder = builder.access_key_id(access_key);
        }
        if let Some(secret_key) = settings.secret_key.as_deref() {
            builder = builder.secret_access_key(secret_key);
        }
        if let Some(root) = settings.root.as_deref() {
            builder = builder.root(root);
        }

        let operator = Operator::new(builder)
            .map_err(|err| StorageError::Configuration(err.to_string()))?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!(
            "s3://{}{}",
            settings.bucket,
            settings
                .root
                .as_deref()
                .map(|root| format!("/{}", root.trim_matches('/')))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn ensure_ready(&self) -> Result<(), StorageError> {
        self.operator
            .check()
            .await
            .map_err(|err| StorageError::backend("check", "/", err.to_string()))
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        let ObjectMetadata {
            content_type,
            cache_control,
            user,
        } = metadata;

        let mut write = self.operator.write_with(key, body).user_metadata(user);
        if let Some(content_type) = content_type.as_deref() {
            write = write.content_type(content_type);
        }
        if let Some(cache_control) = cache_control.as_deref() {
            write = write.cache_control(cache_control);
        }

        write
            .await
            .map_err(|err| StorageError::backend("put", key, err.to_string()))?;
        Ok(())
    }

    async fn put_reader(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        let ObjectMetadata {
            content_type,
            cache_control,
            user,
        } = metadata;

        let mut open = self
            .operator
            .writer_with(key)
            .chunk(UPLOAD_CHUNK_BYTES)
            .user_metadata(user);
        if let Some(content_type) = content_type.as_deref() {
            open = open.content_type(content_type);
        }
        if let Some(cache_control) = cache_control.as_deref() {
            open = open.cache_control(cache_control);
        }
        let mut writer = open
            .await
            .map_err(|err| StorageError::backend("put", key, err.to_string()))?;

        let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            let read = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    let _ = writer.abort().await;
                    return Err(StorageError::backend("put", key, err.to_string()));
                }
            };
            if let Err(err) = writer.write(Bytes::copy_from_slice(&buffer[..read])).await {
                let _ = writer.abort().await;
                return Err(StorageError::backend("put", key, err.to_string()));
            }
        }

        writer
            .close()
            .await
            .map_err(|err| StorageError::backend("put", key, err.to_string()))?;
        Ok(())
    }

    async fn stat_object(&self, key: &str) -> Result<Option<ObjectStat>, StorageError> {
        match self.operator.stat(key).await {
            Ok(meta) => Ok(Some(ObjectStat {
                size: meta.content_length(),
                modified_at: modified_at(&meta),
                content_type: meta.content_type().map(str::to_string),
                cache_control: meta.cache_control().map(str::to_string),
                user: meta.user_metadata().cloned().unwrap_or_default(),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::backend("stat", key, err.to_string())),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let path = if prefix.is_empty() { "/" } else { prefix };
        let mut lister = self
            .operator
            .lister_with(path)
            .recursive(true)
            .await
            .map_err(|err| StorageError::backend("list", prefix, err.to_string()))?;

        let mut objects = Vec::new();
        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|err| StorageError::backend("list", prefix, err.to_string()))?
        {
            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }
            let key = entry.path().trim_start_matches('/').to_string();
            if key.is_empty() || !key.starts_with(prefix) {
                continue;
            }
            objects.push(ObjectInfo {
                key,
                size: meta.content_length(),
                modified_at: modified_at(meta),
            });
        }

        debug!(
            target = "docmirror::storage",
            prefix,
            count = objects.len(),
            "listed objects"
        );
        Ok(objects)
    }

    async fn remove_object(&self, key: &str) -> Result<(), StorageError> {
        self.operator
            .delete(key)
            .await
            .map_err(|err| StorageError::backend("delete", key, err.to_string()))
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let Some(stat) = self.stat_object(key).await? else {
            return Ok(None);
        };

        match self.operator.read(key).await {
            Ok(buffer) => Ok(Some(StoredObject {
                body: buffer.to_bytes(),
                content_type: stat.content_type,
                cache_control: stat.cache_control,
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::backend("get", key, err.to_string())),
        }
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let request = self
            .operator
            .presign_read(key, ttl)
            .await
            .map_err(|err| StorageError::backend("presign", key, err.to_string()))?;
        Ok(request.uri().to_string())
    }
}

fn modified_at(meta: &Metadata) -> Option<OffsetDateTime> {
    meta.last_modified()
        .and_then(|at| OffsetDateTime::from_unix_timestamp(at.timestamp()).ok())
}
