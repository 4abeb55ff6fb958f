use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::util::lock;

use super::{ObjectInfo, ObjectMetadata, ObjectStat, RemoteStore, StorageError, StoredObject};

const OWNER: &str = "infra::storage::memory";

#[derive(Debug, Clone)]
struct MemoryObject {
    body: Bytes,
    metadata: ObjectMetadata,
    modified_at: OffsetDateTime,
}

/// In-process object store.
///
/// Backs the `memory` storage backend and doubles as a test store: failures can
/// be injected per key and every put and delete is counted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    pending_put_failures: Mutex<HashMap<String, u32>>,
    failing_stats: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    puts: AtomicUsize,
    failed_puts: AtomicUsize,
    removes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` puts of `key` fail.
    pub fn fail_next_puts(&self, key: &str, count: u32) {
        lock::lock(&self.pending_put_failures, OWNER).insert(key.to_string(), count);
    }

    /// Make every stat of `key` fail with a backend error.
    pub fn fail_stat(&self, key: &str) {
        lock::lock(&self.failing_stats, OWNER).insert(key.to_string());
    }

    /// Make every removal of `key` fail with a backend error.
    pub fn fail_remove(&self, key: &str) {
        lock::lock(&self.failing_removes, OWNER).insert(key.to_string());
    }

    pub fn set_listing_failure(&self, failing: bool) {
        self.fail_listing.store(failing, Ordering::SeqCst);
    }

    /// Successful puts since creation.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Rejected puts since creation.
    pub fn failed_put_count(&self) -> usize {
        self.failed_puts.load(Ordering::SeqCst)
    }

    /// Successful removals since creation.
    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        lock::read(&self.objects, OWNER).keys().cloned().collect()
    }

    pub fn body(&self, key: &str) -> Option<Bytes> {
        lock::read(&self.objects, OWNER)
            .get(key)
            .map(|object| object.body.clone())
    }

    pub fn metadata(&self, key: &str) -> Option<ObjectMetadata> {
        lock::read(&self.objects, OWNER)
            .get(key)
            .map(|object| object.metadata.clone())
    }

    fn take_put_failure(&self, key: &str) -> bool {
        let mut pending = lock::lock(&self.pending_put_failures, OWNER);
        match pending.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    async fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        if self.take_put_failure(key) {
            self.failed_puts.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::backend("put", key, "injected failure"));
        }

        lock::write(&self.objects, OWNER).insert(
            key.to_string(),
            MemoryObject {
                body,
                metadata,
                modified_at: OffsetDateTime::now_utc(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stat_object(&self, key: &str) -> Result<Option<ObjectStat>, StorageError> {
        if lock::lock(&self.failing_stats, OWNER).contains(key) {
            return Err(StorageError::backend("stat", key, "injected failure"));
        }

        Ok(lock::read(&self.objects, OWNER)
            .get(key)
            .map(|object| ObjectStat {
                size: object.body.len() as u64,
                modified_at: Some(object.modified_at),
                content_type: object.metadata.content_type.clone(),
                cache_control: object.metadata.cache_control.clone(),
                user: object.metadata.user.clone(),
            }))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::backend("list", prefix, "injected failure"));
        }

        Ok(lock::read(&self.objects, OWNER)
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.body.len() as u64,
                modified_at: Some(object.modified_at),
            })
            .collect())
    }

    async fn remove_object(&self, key: &str) -> Result<(), StorageError> {
        if lock::lock(&self.failing_removes, OWNER).contains(key) {
            return Err(StorageError::backend("delete", key, "injected failure"));
        }

        if lock::write(&self.objects, OWNER).remove(key).is_some() {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        Ok(lock::read(&self.objects, OWNER)
            .get(key)
            .map(|object| StoredObject {
                body: object.body.clone(),
                content_type: object.metadata.content_type.clone(),
                cache_control: object.metadata.cache_control.clone(),
            }))
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(format!("memory:///{key}?expires_in={}", ttl.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_is_prefix_scoped() {
        let store = MemoryStore::new();
        for key in ["repo1/a.txt", "repo1/sub/b.txt", "repo10/c.txt"] {
            store
                .put_object(key, Bytes::from_static(b"x"), ObjectMetadata::default())
                .await
                .expect("put should succeed");
        }

        let keys: Vec<String> = store
            .list_objects("repo1/")
            .await
            .expect("list should succeed")
            .into_iter()
            .map(|info| info.key)
            .collect();

        assert_eq!(keys, vec!["repo1/a.txt", "repo1/sub/b.txt"]);
    }

    #[tokio::test]
    async fn put_reader_uploads_from_the_current_position() {
        let store = MemoryStore::new();
        let mut reader = std::io::Cursor::new(b"header:body".to_vec());
        reader.set_position(7);

        store
            .put_reader("k", &mut reader, ObjectMetadata::default())
            .await
            .expect("put should succeed");

        assert_eq!(store.body("k"), Some(Bytes::from_static(b"body")));
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn injected_put_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_puts("k", 1);

        assert!(
            store
                .put_object("k", Bytes::new(), ObjectMetadata::default())
                .await
                .is_err()
        );
        assert!(
            store
                .put_object("k", Bytes::new(), ObjectMetadata::default())
                .await
                .is_ok()
        );
        assert_eq!(store.failed_put_count(), 1);
        assert_eq!(store.put_count(), 1);
    }
}
