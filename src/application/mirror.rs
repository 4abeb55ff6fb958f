//! Mirrors configured external URLs into the object store and serves them from there.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ExternalUrlSettings,
    infra::storage::{ObjectMetadata, RemoteStore, StorageError, StoredObject},
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("no external url is configured for `{0}`")]
    UnknownPath(String),
    #[error("every source for `{path}` failed: {reasons:?}")]
    Download { path: String, reasons: Vec<String> },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

pub struct ExternalMirror {
    client: Client,
    store: Arc<dyn RemoteStore>,
    entries: Vec<ExternalUrlSettings>,
    last_checked: DashMap<String, Instant>,
}

impl ExternalMirror {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        entries: Vec<ExternalUrlSettings>,
    ) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(concat!("docmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MirrorError::Client)?;

        Ok(Self {
            client,
            store,
            entries,
            last_checked: DashMap::new(),
        })
    }

    pub fn entries(&self) -> &[ExternalUrlSettings] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&ExternalUrlSettings> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// Claim the next check of `entry` if its interval has elapsed. Only one
    /// caller per interval gets `true`.
    fn claim_check(&self, entry: &ExternalUrlSettings) -> bool {
        let now = Instant::now();
        match self.last_checked.entry(entry.path.clone()) {
            Entry::Occupied(mut slot) => {
                if now.duration_since(*slot.get()) < entry.check_interval {
                    return false;
                }
                slot.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    async fn download(&self, entry: &ExternalUrlSettings) -> Result<Bytes, MirrorError> {
        let mut reasons = Vec::new();

        for url in std::iter::once(&entry.main_url).chain(entry.backup_urls.iter()) {
            match self.fetch_url(url).await {
                Ok(body) => return Ok(body),
                Err(reason) => {
                    warn!(
                        target = "docmirror::mirror",
                        path = %entry.path,
                        url = %url,
                        reason = %reason,
                        "external source failed"
                    );
                    reasons.push(format!("{url}: {reason}"));
                }
            }
        }

        Err(MirrorError::Download {
            path: entry.path.clone(),
            reasons,
        })
    }

    async fn fetch_url(&self, url: &Url) -> Result<Bytes, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status() != StatusCode::OK {
            return Err(format!("unexpected status {}", response.status()));
        }

        response.bytes().await.map_err(|err| err.to_string())
    }

    /// Download `entry` and overwrite its stored copy.
    pub async fn refresh(&self, entry: &ExternalUrlSettings) -> Result<(), MirrorError> {
        let body = self.download(entry).await?;
        let content_type = mime_guess::from_path(entry.main_url.path())
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let size = body.len();

        self.store
            .put_object(
                &entry.remote_key,
                body,
                ObjectMetadata {
                    content_type: Some(content_type),
                    cache_control: Some(entry.cache_control.clone()),
                    ..ObjectMetadata::default()
                },
            )
            .await?;

        info!(
            target = "docmirror::mirror",
            path = %entry.path,
            remote_key = %entry.remote_key,
            size,
            "external url mirrored"
        );
        Ok(())
    }

    async fn refresh_if_due(&self, entry: &ExternalUrlSettings) {
        if !self.claim_check(entry) {
            return;
        }
        if let Err(err) = self.refresh(entry).await {
            warn!(
                target = "docmirror::mirror",
                path = %entry.path,
                error = %err,
                "mirror refresh failed, serving stored copy"
            );
        }
    }

    /// Stored copy for `path`, refreshed first when its check interval has elapsed.
    pub async fn fetch(&self, path: &str) -> Result<Option<StoredObject>, MirrorError> {
        let entry = self
            .entry(path)
            .ok_or_else(|| MirrorError::UnknownPath(path.to_string()))?;

        self.refresh_if_due(entry).await;
        Ok(self.store.get_object(&entry.remote_key).await?)
    }

    /// Mirror every entry once; failures are logged.
    pub async fn warm_all(&self) {
        debug!(target = "docmirror::mirror", entries = self.entries.len(), "warming mirrors");
        join_all(self.entries.iter().map(|entry| self.refresh_if_due(entry))).await;
    }
}
