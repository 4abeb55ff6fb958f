//! Disk-backed response store.
//!
//! Each entry is a content file named by its fingerprint plus a JSON sidecar
//! `<fingerprint>.meta`. The content file's modification time doubles as the
//! last-access time used for eviction.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use axum::http::{HeaderMap, header};
use bytes::Bytes;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{config::RequestClass, keys::is_fingerprint};

const META_SUFFIX: &str = ".meta";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io failed for `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache metadata for `{path}` is invalid: {source}")]
    Metadata {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    class: RequestClass,
    status: u16,
    stored_at_ms: i64,
    headers: BTreeMap<String, String>,
}

/// A replayable response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub class: RequestClass,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

#[derive(Debug)]
pub enum Lookup {
    Hit(CachedResponse),
    /// Present but past its TTL; treated as a miss.
    Expired,
    Miss,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub corrupt: usize,
    pub evicted: usize,
    /// Entries that should have been removed but could not be.
    pub failed: usize,
    pub remaining_entries: usize,
    pub remaining_bytes: u64,
}

struct LiveEntry {
    fingerprint: String,
    size: u64,
    accessed: SystemTime,
}

pub struct DiskCache {
    directory: PathBuf,
    file_ttl: Duration,
    api_ttl: Duration,
    lock: RwLock<()>,
}

impl DiskCache {
    pub fn new(directory: impl Into<PathBuf>, file_ttl: Duration, api_ttl: Duration) -> Self {
        Self {
            directory: directory.into(),
            file_ttl,
            api_ttl,
            lock: RwLock::new(()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn content_path(&self, fingerprint: &str) -> PathBuf {
        self.directory.join(fingerprint)
    }

    fn meta_path(&self, fingerprint: &str) -> PathBuf {
        self.directory.join(format!("{fingerprint}{META_SUFFIX}"))
    }

    fn ttl_for(&self, class: RequestClass) -> Duration {
        match class {
            RequestClass::Api => self.api_ttl,
            RequestClass::File => self.file_ttl,
        }
    }

    fn is_expired(&self, meta: &EntryMeta, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl_for(meta.class).as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(meta.stored_at_ms) > ttl_ms
    }

    pub async fn ensure_directory(&self) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| CacheError::io(&self.directory, source))
    }

    pub async fn lookup(&self, fingerprint: &str) -> Result<Lookup, CacheError> {
        let _guard = self.lock.read().await;

        let meta = match self.read_meta(fingerprint).await {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(Lookup::Miss),
            Err(CacheError::Metadata { path, source }) => {
                debug!(target = "docmirror::cache", path = %path, error = %source, "unreadable sidecar");
                return Ok(Lookup::Miss);
            }
            Err(err) => return Err(err),
        };

        if self.is_expired(&meta, now_ms()) {
            return Ok(Lookup::Expired);
        }

        let content_path = self.content_path(fingerprint);
        let body = match tokio::fs::read(&content_path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Lookup::Miss),
            Err(err) => return Err(CacheError::io(&content_path, err)),
        };

        if let Err(err) = filetime::set_file_mtime(&content_path, FileTime::now()) {
            debug!(
                target = "docmirror::cache",
                path = %content_path.display(),
                error = %err,
                "failed to record access time"
            );
        }

        Ok(Lookup::Hit(CachedResponse {
            class: meta.class,
            status: meta.status,
            headers: meta.headers,
            body: Bytes::from(body),
        }))
    }

    /// Persist a response. `Cache-Control` is never stored.
    pub async fn store(
        &self,
        fingerprint: &str,
        class: RequestClass,
        status: u16,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<(), CacheError> {
        let headers: BTreeMap<String, String> = headers
            .iter()
            .filter(|(name, _)| **name != header::CACHE_CONTROL)
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let meta = EntryMeta {
            class,
            status,
            stored_at_ms: now_ms(),
            headers,
        };
        let meta_bytes = serde_json::to_vec(&meta).map_err(|source| CacheError::Metadata {
            path: self.meta_path(fingerprint).display().to_string(),
            source,
        })?;

        let _guard = self.lock.write().await;

        let content_path = self.content_path(fingerprint);
        tokio::fs::write(&content_path, body)
            .await
            .map_err(|source| CacheError::io(&content_path, source))?;

        let meta_path = self.meta_path(fingerprint);
        tokio::fs::write(&meta_path, meta_bytes)
            .await
            .map_err(|source| CacheError::io(&meta_path, source))?;

        Ok(())
    }

    /// Remove the entry if it is still expired. Returns whether anything was removed.
    pub async fn remove_if_expired(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let _guard = self.lock.write().await;

        match self.read_meta(fingerprint).await {
            Ok(Some(meta)) if self.is_expired(&meta, now_ms()) => {
                self.remove_entry(fingerprint).await?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(CacheError::Metadata { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Drop expired, corrupt and orphaned entries, then evict least recently
    /// accessed entries until the total content size is within `max_bytes`.
    pub async fn sweep(&self, max_bytes: u64) -> Result<SweepReport, CacheError> {
        let _guard = self.lock.write().await;
        let now = now_ms();
        let mut report = SweepReport::default();
        let mut live = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(report),
            Err(err) => return Err(CacheError::io(&self.directory, err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| CacheError::io(&self.directory, source))?
        {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }

        // Bytes held by entries that could not be removed; they still count
        // against the budget but are never eviction candidates.
        let mut pinned_bytes = 0_u64;

        for name in names {
            if let Some(fingerprint) = name.strip_suffix(META_SUFFIX) {
                if !is_fingerprint(fingerprint) {
                    continue;
                }
                let content_exists = tokio::fs::try_exists(self.content_path(fingerprint))
                    .await
                    .unwrap_or(false);
                if !content_exists {
                    if self.remove_entry(fingerprint).await.is_ok() {
                        report.corrupt += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                continue;
            }

            if !is_fingerprint(&name) {
                continue;
            }

            let expired = match self.read_meta(&name).await {
                Ok(Some(meta)) => self.is_expired(&meta, now).then_some(true),
                Ok(None) | Err(CacheError::Metadata { .. }) => Some(false),
                Err(err) => {
                    warn!(target = "docmirror::cache", error = %err, "skipping unreadable entry");
                    pinned_bytes += self.entry_size(&name).await;
                    report.failed += 1;
                    continue;
                }
            };

            if let Some(expired) = expired {
                if self.remove_entry(&name).await.is_ok() {
                    if expired {
                        report.expired += 1;
                    } else {
                        report.corrupt += 1;
                    }
                } else {
                    pinned_bytes += self.entry_size(&name).await;
                    report.failed += 1;
                }
                continue;
            }

            let content_path = self.content_path(&name);
            let metadata = match tokio::fs::metadata(&content_path).await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(
                        target = "docmirror::cache",
                        path = %content_path.display(),
                        error = %err,
                        "skipping entry without metadata"
                    );
                    report.failed += 1;
                    continue;
                }
            };
            live.push(LiveEntry {
                fingerprint: name,
                size: metadata.len(),
                accessed: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        let mut total: u64 = pinned_bytes + live.iter().map(|entry| entry.size).sum::<u64>();
        if total > max_bytes {
            live.sort_by_key(|entry| entry.accessed);
            let mut kept = Vec::with_capacity(live.len());
            for entry in live {
                if total <= max_bytes {
                    kept.push(entry);
                    continue;
                }
                if self.remove_entry(&entry.fingerprint).await.is_ok() {
                    total = total.saturating_sub(entry.size);
                    report.evicted += 1;
                } else {
                    report.failed += 1;
                    kept.push(entry);
                }
            }
            live = kept;
        }

        report.remaining_entries = live.len();
        report.remaining_bytes = total;
        Ok(report)
    }

    /// Delete every entry and recreate the directory.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;
        match tokio::fs::remove_dir_all(&self.directory).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::io(&self.directory, err)),
        }
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| CacheError::io(&self.directory, source))
    }

    async fn read_meta(&self, fingerprint: &str) -> Result<Option<EntryMeta>, CacheError> {
        let path = self.meta_path(fingerprint);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(&path, err)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| CacheError::Metadata {
                path: path.display().to_string(),
                source,
            })
    }

    async fn entry_size(&self, fingerprint: &str) -> u64 {
        tokio::fs::metadata(self.content_path(fingerprint))
            .await
            .map(|metadata| metadata.len())
            .unwrap_or(0)
    }

    async fn remove_entry(&self, fingerprint: &str) -> Result<(), CacheError> {
        for path in [self.content_path(fingerprint), self.meta_path(fingerprint)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "docmirror::cache",
                        path = %path.display(),
                        error = %err,
                        "failed to remove cache file"
                    );
                    return Err(CacheError::io(&path, err));
                }
            }
        }
        Ok(())
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
