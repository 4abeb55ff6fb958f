use std::{
    collections::{HashMap, HashSet},
    io::SeekFrom,
    num::{NonZeroU32, NonZeroUsize},
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs::File, io::AsyncSeekExt};
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use crate::{
    application::hashing::digest_reader,
    config::Settings,
    domain::{repository::RepositorySpec, sync::SyncStatus},
    infra::{
        storage::{DIGEST_METADATA_KEY, ObjectMetadata, RemoteStore, StorageError},
        vcs::{VcsClient, VcsError},
    },
};

use super::registry::SyncRegistry;

const METRIC_SYNC_CYCLES: &str = "docmirror_sync_cycles_total";
const METRIC_SYNC_UPLOADS: &str = "docmirror_sync_uploads_total";
const METRIC_SYNC_UPLOAD_FAILURES: &str = "docmirror_sync_upload_failures_total";
const METRIC_SYNC_DELETES: &str = "docmirror_sync_deletes_total";
const METRIC_SYNC_CYCLE_MS: &str = "docmirror_sync_cycle_ms";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to refresh working tree: {0}")]
    Refresh(#[from] VcsError),
    #[error("failed to enumerate `{path}`: {message}")]
    Enumerate { path: String, message: String },
    #[error("failed to list remote objects: {0}")]
    Listing(#[source] StorageError),
    #[error("working tree `{path}` is not below the git cache root")]
    OutsideGitRoot { path: String },
}

/// Engine tunables, resolved from settings once at startup.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub git_root: PathBuf,
    pub upload_concurrency: NonZeroUsize,
    pub retry_attempts: NonZeroU32,
    pub retry_delay: Duration,
    pub process_log: bool,
}

impl SyncEngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            git_root: settings.git.cache_path.clone(),
            upload_concurrency: settings.storage.max_workers,
            retry_attempts: settings.git.retry_attempts,
            retry_delay: settings.git.retry_delay,
            process_log: settings.logging.process_log,
        }
    }
}

/// How a cycle is gated against the last trigger of its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Run only when the interval has elapsed since the last trigger.
    Scheduled(Duration),
    /// Run unconditionally.
    Forced,
}

impl SyncMode {
    fn interval(self) -> Duration {
        match self {
            SyncMode::Scheduled(interval) => interval,
            SyncMode::Forced => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub total: u64,
    pub uploaded: u64,
    pub unchanged: u64,
    pub skipped: u64,
    /// Files whose every upload attempt failed.
    pub failed: u64,
    /// Failed upload attempts, including ones that later succeeded.
    pub upload_failures: u64,
    pub deleted: u64,
    pub delete_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped,
    Completed(SyncReport),
}

#[derive(Debug, Clone)]
struct UploadJob {
    local: PathBuf,
    key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Uploaded { failures: u32 },
    Unchanged,
    Skipped,
    Failed { failures: u32 },
}

#[derive(Debug, Error)]
enum UploadError {
    #[error("failed to read local file: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StorageError),
}

/// Converges a remote key prefix with the tip of a git branch.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    vcs: Arc<dyn VcsClient>,
    registry: Arc<SyncRegistry>,
    config: SyncEngineConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        vcs: Arc<dyn VcsClient>,
        registry: Arc<SyncRegistry>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            store,
            vcs,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.registry
    }

    pub fn status(&self, prefix: &str) -> SyncStatus {
        self.registry.status(prefix)
    }

    /// Working tree location of `repo`.
    pub fn tree_path(&self, repo: &RepositorySpec) -> PathBuf {
        self.config.git_root.join(&repo.local_subpath)
    }

    #[instrument(skip_all, fields(remote_prefix = %repo.remote_prefix))]
    pub async fn sync(
        &self,
        repo: &RepositorySpec,
        mode: SyncMode,
    ) -> Result<SyncOutcome, SyncError> {
        let prefix = repo.remote_prefix.as_str();
        let interval = mode.interval();

        if !self.registry.try_begin(prefix, interval) {
            debug!(target = "docmirror::sync", remote_prefix = prefix, "cycle not due");
            return Ok(SyncOutcome::Skipped);
        }

        let started_at = OffsetDateTime::now_utc();
        let started = Instant::now();
        let next_sync_time = (!interval.is_zero()).then(|| started_at + interval);
        self.registry
            .update_status(prefix, |status| status.begin_cycle(next_sync_time));

        info!(target = "docmirror::sync", remote_prefix = prefix, "sync cycle started");

        let result = self.run_cycle(repo).await;
        histogram!(METRIC_SYNC_CYCLE_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(report) => {
                self.registry
                    .update_status(prefix, |status| status.finish_ok(started_at));
                counter!(METRIC_SYNC_CYCLES, "result" => "ok").increment(1);
                info!(
                    target = "docmirror::sync",
                    remote_prefix = prefix,
                    total = report.total,
                    uploaded = report.uploaded,
                    unchanged = report.unchanged,
                    skipped = report.skipped,
                    failed = report.failed,
                    deleted = report.deleted,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync cycle completed"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                let message = err.to_string();
                self.registry
                    .update_status(prefix, |status| status.finish_err(started_at, message));
                counter!(METRIC_SYNC_CYCLES, "result" => "error").increment(1);
                error!(
                    target = "docmirror::sync",
                    remote_prefix = prefix,
                    error = %err,
                    "sync cycle failed"
                );
                Err(err)
            }
        }
    }

    async fn run_cycle(&self, repo: &RepositorySpec) -> Result<SyncReport, SyncError> {
        let prefix = repo.remote_prefix.as_str();
        let tree = self.tree_path(repo);

        self.refresh(repo, &tree).await?;

        let jobs = {
            let root = tree.clone();
            let key_prefix = prefix.to_string();
            tokio::task::spawn_blocking(move || enumerate(&root, &key_prefix))
                .await
                .map_err(|err| SyncError::Enumerate {
                    path: tree.display().to_string(),
                    message: err.to_string(),
                })??
        };

        let total = jobs.len() as u64;
        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };
        self.registry
            .update_status(prefix, |status| status.record_progress(0, total));

        let expected: HashSet<String> = jobs.iter().map(|job| job.key.clone()).collect();

        let mut outcomes = stream::iter(jobs)
            .map(|job| self.process(job))
            .buffer_unordered(self.config.upload_concurrency.get());

        let mut processed = 0_u64;
        while let Some(outcome) = outcomes.next().await {
            processed += 1;
            match outcome {
                JobOutcome::Uploaded { failures } => {
                    report.uploaded += 1;
                    report.upload_failures += u64::from(failures);
                }
                JobOutcome::Unchanged => report.unchanged += 1,
                JobOutcome::Skipped => report.skipped += 1,
                JobOutcome::Failed { failures } => {
                    report.failed += 1;
                    report.upload_failures += u64::from(failures);
                }
            }
            self.registry
                .update_status(prefix, |status| status.record_progress(processed, total));
        }
        drop(outcomes);

        counter!(METRIC_SYNC_UPLOADS).increment(report.uploaded);
        counter!(METRIC_SYNC_UPLOAD_FAILURES).increment(report.upload_failures);

        self.reconcile(prefix, &expected, &mut report).await?;
        counter!(METRIC_SYNC_DELETES).increment(report.deleted);

        Ok(report)
    }

    async fn refresh(&self, repo: &RepositorySpec, tree: &Path) -> Result<(), SyncError> {
        if !is_strictly_below(&self.config.git_root, tree) {
            return Err(SyncError::OutsideGitRoot {
                path: tree.display().to_string(),
            });
        }

        let has_checkout = tokio::fs::try_exists(tree.join(".git"))
            .await
            .unwrap_or(false);

        if has_checkout {
            self.vcs.fetch_shallow(tree, &repo.branch).await?;
            self.vcs.reset_hard(tree, &repo.branch).await?;
            return Ok(());
        }

        if tokio::fs::try_exists(tree).await.unwrap_or(false) {
            warn!(
                target = "docmirror::sync",
                path = %tree.display(),
                "replacing directory without a git checkout"
            );
            tokio::fs::remove_dir_all(tree)
                .await
                .map_err(|source| VcsError::Prepare {
                    path: tree.display().to_string(),
                    source,
                })?;
        }

        self.vcs
            .clone_shallow(&repo.remote_url, &repo.branch, tree)
            .await?;
        Ok(())
    }

    async fn process(&self, job: UploadJob) -> JobOutcome {
        let mut file = match File::open(&job.local).await {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    target = "docmirror::sync",
                    path = %job.local.display(),
                    error = %err,
                    "skipping unreadable file"
                );
                return JobOutcome::Skipped;
            }
        };

        let digest = match digest_reader(&mut file).await {
            Ok(digest) => digest,
            Err(err) => {
                warn!(
                    target = "docmirror::sync",
                    path = %job.local.display(),
                    error = %err,
                    "skipping file that could not be hashed"
                );
                return JobOutcome::Skipped;
            }
        };

        match self.store.stat_object(&job.key).await {
            Ok(Some(stat)) if stat.digest() == Some(digest.as_str()) => {
                if self.config.process_log {
                    debug!(target = "docmirror::sync", key = %job.key, "unchanged");
                }
                return JobOutcome::Unchanged;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    target = "docmirror::sync",
                    key = %job.key,
                    error = %err,
                    "remote state unknown, skipping file"
                );
                return JobOutcome::Skipped;
            }
        }

        self.upload(&job, &mut file, &digest).await
    }

    async fn upload(&self, job: &UploadJob, file: &mut File, digest: &str) -> JobOutcome {
        let metadata = ObjectMetadata {
            content_type: Some(
                mime_guess::from_path(&job.local)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
            ),
            cache_control: None,
            user: HashMap::from([(DIGEST_METADATA_KEY.to_string(), digest.to_string())]),
        };

        let attempts = self.config.retry_attempts.get();
        let mut failures = 0_u32;

        for attempt in 1..=attempts {
            match self.put_from_start(job, file, metadata.clone()).await {
                Ok(()) => {
                    if self.config.process_log {
                        info!(target = "docmirror::sync", key = %job.key, attempt, "uploaded");
                    }
                    return JobOutcome::Uploaded { failures };
                }
                Err(err) => {
                    failures += 1;
                    warn!(
                        target = "docmirror::sync",
                        key = %job.key,
                        attempt,
                        attempts,
                        error = %err,
                        "upload attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        error!(
            target = "docmirror::sync",
            key = %job.key,
            attempts,
            "upload retries exhausted, skipping file"
        );
        JobOutcome::Failed { failures }
    }

    async fn put_from_start(
        &self,
        job: &UploadJob,
        file: &mut File,
        metadata: ObjectMetadata,
    ) -> Result<(), UploadError> {
        file.seek(SeekFrom::Start(0)).await?;
        self.store.put_reader(&job.key, file, metadata).await?;
        Ok(())
    }

    async fn reconcile(
        &self,
        prefix: &str,
        expected: &HashSet<String>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let listing_prefix = format!("{prefix}/");
        let objects = self
            .store
            .list_objects(&listing_prefix)
            .await
            .map_err(SyncError::Listing)?;

        for object in objects {
            if expected.contains(&object.key) {
                continue;
            }
            match self.store.remove_object(&object.key).await {
                Ok(()) => {
                    report.deleted += 1;
                    if self.config.process_log {
                        info!(target = "docmirror::sync", key = %object.key, "deleted orphan");
                    }
                }
                Err(err) => {
                    report.delete_failures += 1;
                    warn!(
                        target = "docmirror::sync",
                        key = %object.key,
                        error = %err,
                        "failed to delete orphan"
                    );
                }
            }
        }

        Ok(())
    }
}

fn enumerate(root: &Path, prefix: &str) -> Result<Vec<UploadJob>, SyncError> {
    let mut jobs = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(SyncError::Enumerate {
                    path: root.display().to_string(),
                    message: err.to_string(),
                });
            }
            Err(err) => {
                warn!(target = "docmirror::sync", error = %err, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        jobs.push(UploadJob {
            local: entry.path().to_path_buf(),
            key: remote_key(prefix, relative),
        });
    }

    Ok(jobs)
}

/// `tree` lies inside `root` and is not `root` itself.
fn is_strictly_below(root: &Path, tree: &Path) -> bool {
    match tree.strip_prefix(root) {
        Ok(relative) => {
            let mut components = relative.components().peekable();
            components.peek().is_some()
                && components.all(|component| matches!(component, Component::Normal(_)))
        }
        Err(_) => false,
    }
}

/// Object key for `relative` under `prefix`, always `/`-separated.
pub fn remote_key(prefix: &str, relative: &Path) -> String {
    let mut segments: Vec<String> = Vec::new();
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        segments.push(prefix.to_string());
    }
    segments.extend(relative.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }));
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_key_joins_with_forward_slashes() {
        assert_eq!(
            remote_key("docs", Path::new("guide/intro.md")),
            "docs/guide/intro.md"
        );
        assert_eq!(remote_key("/docs/", Path::new("a.txt")), "docs/a.txt");
        assert_eq!(remote_key("", Path::new("./a.txt")), "a.txt");
    }

    #[test]
    fn enumerate_skips_git_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git/objects")).expect("git dir");
        std::fs::write(dir.path().join(".git/HEAD"), "ref").expect("head");
        std::fs::create_dir_all(dir.path().join("guide")).expect("guide dir");
        std::fs::write(dir.path().join("guide/intro.md"), "# intro").expect("intro");
        std::fs::write(dir.path().join("index.md"), "# index").expect("index");

        let mut keys: Vec<String> = enumerate(dir.path(), "docs")
            .expect("enumerate")
            .into_iter()
            .map(|job| job.key)
            .collect();
        keys.sort();

        assert_eq!(keys, vec!["docs/guide/intro.md", "docs/index.md"]);
    }

    #[test]
    fn enumerate_fails_for_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent");

        assert!(matches!(
            enumerate(&missing, "docs"),
            Err(SyncError::Enumerate { .. })
        ));
    }

    #[test]
    fn trees_must_sit_strictly_below_the_git_root() {
        let root = Path::new("/var/cache/repos");

        assert!(is_strictly_below(root, &root.join("docs")));
        assert!(is_strictly_below(root, &root.join("team/docs")));
        assert!(!is_strictly_below(root, &root.join(".")));
        assert!(!is_strictly_below(root, root));
        assert!(!is_strictly_below(root, &root.join("../etc")));
        assert!(!is_strictly_below(root, &root.join("docs/../../etc")));
        assert!(!is_strictly_below(root, Path::new("/etc")));
    }

    #[test]
    fn forced_mode_has_zero_interval() {
        assert_eq!(SyncMode::Forced.interval(), Duration::ZERO);
        assert_eq!(
            SyncMode::Scheduled(Duration::from_secs(5)).interval(),
            Duration::from_secs(5)
        );
    }
}
