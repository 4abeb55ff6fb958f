//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::HashSet,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::{Component, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    domain::repository::{ExposedPath, RepositorySpec},
    util::{bytes::mb_to_bytes, duration::parse_duration},
};

pub use cli::{
    ClearCacheArgs, CliArgs, Command, LogOverrides, RsyncArgs, ServeArgs, ServeOverrides,
    SyncArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "docmirror";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_PRESIGN_TTL: &str = "1h";
const DEFAULT_MAX_WORKERS: u64 = 16;
const DEFAULT_GIT_CACHE_PATH: &str = ".cache/repos";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: &str = "2s";
const DEFAULT_SCHEDULER_WORKERS: u64 = 2;
const DEFAULT_SCHEDULER_CADENCE: &str = "10m";
const DEFAULT_CACHE_DIRECTORY: &str = ".cache/files";
const DEFAULT_CACHE_MAX_SIZE_MB: u64 = 1000;
const DEFAULT_CACHE_FILE_TTL: &str = "30d";
const DEFAULT_CACHE_API_TTL: &str = "5m";
const DEFAULT_CACHE_SWEEP_INTERVAL: &str = "15m";
const DEFAULT_CACHE_EXCLUDED_PREFIX: &str = "/api/files/sync/status";
const DEFAULT_EXTERNAL_CACHE_CONTROL: &str = "max-age=3600";
const DEFAULT_EXTERNAL_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub git: GitSettings,
    pub scheduler: SchedulerSettings,
    pub exposed_paths: Vec<ExposedPath>,
    pub cache: CacheSettings,
    pub external_urls: Vec<ExternalUrlSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub enable_api: bool,
    pub api_only: bool,
    /// Redirect `/files/<path>` to `/<path>` for old links.
    pub legacy_api: bool,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub access_log: bool,
    pub process_log: bool,
    pub redirect_log: bool,
    pub presign_log: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub root: Option<String>,
    /// Redirect file requests to presigned URLs instead of proxying bodies.
    pub use_public_url: bool,
    pub presign_ttl: Duration,
    /// Concurrent uploads per sync cycle.
    pub max_workers: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct GitSettings {
    pub cache_path: PathBuf,
    pub retry_attempts: NonZeroU32,
    pub retry_delay: Duration,
    pub repositories: Vec<RepositorySpec>,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Repositories synced in parallel.
    pub workers: NonZeroUsize,
    pub cadence: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub max_size_bytes: u64,
    pub file_ttl: Duration,
    pub api_ttl: Duration,
    pub cache_log: bool,
    pub hit_log: bool,
    pub api_caching_enabled: bool,
    pub api_excluded_prefixes: Vec<String>,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ExternalUrlSettings {
    /// Request path served by this mirror, e.g. `/external/logo.png`.
    pub path: String,
    pub main_url: Url,
    pub backup_urls: Vec<Url>,
    pub remote_key: String,
    pub cache_control: String,
    pub check_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DOCMIRROR").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Sync(args)) => raw.apply_sync_overrides(args),
        Some(Command::Rsync(args)) => raw.apply_sync_overrides(&args.sync),
        Some(Command::ClearCache(args)) => {
            if let Some(directory) = args.cache_directory.as_ref() {
                raw.cache.directory = Some(directory.clone());
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    git: RawGitSettings,
    scheduler: RawSchedulerSettings,
    exposed_paths: Vec<RawExposedPath>,
    cache: RawCacheSettings,
    external_urls: Vec<RawExternalUrl>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_log_overrides(&overrides.log);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(workers) = overrides.storage_max_workers {
            self.storage.max_workers = Some(workers);
        }
        if let Some(workers) = overrides.scheduler_workers {
            self.scheduler.workers = Some(workers);
        }
    }

    fn apply_sync_overrides(&mut self, overrides: &SyncArgs) {
        self.apply_log_overrides(&overrides.log);
        if let Some(workers) = overrides.storage_max_workers {
            self.storage.max_workers = Some(workers);
        }
    }

    fn apply_log_overrides(&mut self, overrides: &LogOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            storage,
            git,
            scheduler,
            exposed_paths,
            cache,
            external_urls,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let storage = build_storage_settings(storage)?;
        let git = build_git_settings(git)?;
        let scheduler = build_scheduler_settings(scheduler)?;
        let exposed_paths = build_exposed_paths(exposed_paths)?;
        let cache = build_cache_settings(cache)?;
        let external_urls = build_external_urls(external_urls)?;

        Ok(Self {
            server,
            logging,
            storage,
            git,
            scheduler,
            exposed_paths,
            cache,
            external_urls,
        })
    }

    /// Look up a configured repository by its remote prefix.
    pub fn repository(&self, remote_prefix: &str) -> Option<&RepositorySpec> {
        let wanted = remote_prefix.trim_matches('/');
        self.git
            .repositories
            .iter()
            .find(|repo| repo.remote_prefix == wanted)
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let enable_api = server.enable_api.unwrap_or(true);
    let api_only = server.api_only.unwrap_or(false);
    if api_only && !enable_api {
        return Err(LoadError::invalid(
            "server.api_only",
            "cannot serve API routes only while the API is disabled",
        ));
    }

    Ok(ServerSettings {
        addr,
        enable_api,
        api_only,
        legacy_api: server.legacy_api.unwrap_or(false),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings {
        level,
        format,
        access_log: logging.access_log.unwrap_or(false),
        process_log: logging.process_log.unwrap_or(false),
        redirect_log: logging.redirect_log.unwrap_or(false),
        presign_log: logging.presign_log.unwrap_or(false),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = match storage.backend.as_deref().map(str::trim) {
        None | Some("s3") => StorageBackend::S3,
        Some("memory") => StorageBackend::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "storage.backend",
                format!("unknown backend `{other}` (expected `s3` or `memory`)"),
            ));
        }
    };

    let endpoint = non_empty(storage.endpoint);
    if let Some(endpoint) = endpoint.as_deref() {
        Url::parse(endpoint)
            .map_err(|err| LoadError::invalid("storage.endpoint", err.to_string()))?;
    }

    let presign_ttl = parse_duration_setting(
        "storage.presign_ttl",
        storage.presign_ttl.as_deref(),
        DEFAULT_PRESIGN_TTL,
    )?;

    // A zero worker count is raised to one.
    let max_workers = NonZeroUsize::new(
        usize::try_from(storage.max_workers.unwrap_or(DEFAULT_MAX_WORKERS)).unwrap_or(usize::MAX),
    )
    .unwrap_or(NonZeroUsize::MIN);

    Ok(StorageSettings {
        backend,
        endpoint,
        region: non_empty(storage.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        bucket: non_empty(storage.bucket).unwrap_or_default(),
        access_key: non_empty(storage.access_key),
        secret_key: non_empty(storage.secret_key),
        root: non_empty(storage.root),
        use_public_url: storage.use_public_url.unwrap_or(true),
        presign_ttl,
        max_workers,
    })
}

fn build_git_settings(git: RawGitSettings) -> Result<GitSettings, LoadError> {
    let cache_path = git
        .cache_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_GIT_CACHE_PATH));
    if cache_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "git.cache_path",
            "path must not be empty",
        ));
    }

    let retry_attempts = non_zero_u32(
        git.retry_attempts
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS.into()),
        "git.retry_attempts",
    )?;
    let retry_delay = parse_duration_setting(
        "git.retry_delay",
        git.retry_delay.as_deref(),
        DEFAULT_RETRY_DELAY,
    )?;

    let mut seen = HashSet::new();
    let mut repositories = Vec::with_capacity(git.repositories.len());
    for raw in git.repositories {
        let repo = build_repository(raw)?;
        if !seen.insert(repo.remote_prefix.clone()) {
            return Err(LoadError::invalid(
                "git.repositories",
                format!("duplicate remote_prefix `{}`", repo.remote_prefix),
            ));
        }
        if let Some(other) = repositories.iter().find(|other: &&RepositorySpec| {
            other.local_subpath.starts_with(&repo.local_subpath)
                || repo.local_subpath.starts_with(&other.local_subpath)
        }) {
            return Err(LoadError::invalid(
                "git.repositories.local_path",
                format!(
                    "local_path `{}` overlaps `{}`",
                    repo.local_subpath.display(),
                    other.local_subpath.display()
                ),
            ));
        }
        repositories.push(repo);
    }

    Ok(GitSettings {
        cache_path,
        retry_attempts,
        retry_delay,
        repositories,
    })
}

fn build_repository(raw: RawRepository) -> Result<RepositorySpec, LoadError> {
    let remote_url = non_empty(raw.url)
        .ok_or_else(|| LoadError::invalid("git.repositories.url", "url must not be empty"))?;

    let remote_prefix = raw
        .remote_prefix
        .map(|prefix| prefix.trim().trim_matches('/').to_string())
        .filter(|prefix| !prefix.is_empty())
        .ok_or_else(|| {
            LoadError::invalid(
                "git.repositories.remote_prefix",
                format!("remote_prefix must be set for `{remote_url}`"),
            )
        })?;

    let local_subpath = raw
        .local_path
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(&remote_prefix));
    if !local_subpath
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(LoadError::invalid(
            "git.repositories.local_path",
            format!(
                "local_path `{}` must be a plain relative path below git.cache_path",
                local_subpath.display()
            ),
        ));
    }

    Ok(RepositorySpec {
        remote_url,
        branch: non_empty(raw.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        local_subpath,
        remote_prefix,
        sync_disabled: raw.sync_disabled.unwrap_or(false),
        check_interval: non_empty(raw.check_interval),
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let workers = scheduler.workers.unwrap_or(DEFAULT_SCHEDULER_WORKERS);
    let workers = usize::try_from(workers)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("scheduler.workers", "must be greater than zero"))?;

    let cadence = parse_duration_setting(
        "scheduler.cadence",
        scheduler.cadence.as_deref(),
        DEFAULT_SCHEDULER_CADENCE,
    )?;
    if cadence.is_zero() {
        return Err(LoadError::invalid(
            "scheduler.cadence",
            "must be greater than zero",
        ));
    }

    Ok(SchedulerSettings { workers, cadence })
}

fn build_exposed_paths(raw: Vec<RawExposedPath>) -> Result<Vec<ExposedPath>, LoadError> {
    raw.into_iter()
        .map(|entry| {
            let url_path = entry
                .url_path
                .map(|path| path.trim().trim_matches('/').to_string())
                .filter(|path| !path.is_empty())
                .ok_or_else(|| {
                    LoadError::invalid("exposed_paths.url_path", "url_path must not be empty")
                })?;
            let remote_prefix = entry
                .remote_prefix
                .map(|prefix| prefix.trim().trim_matches('/').to_string())
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or_else(|| url_path.clone());
            Ok(ExposedPath {
                url_path,
                remote_prefix,
            })
        })
        .collect()
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIRECTORY));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let max_size_mb = cache.max_size_mb.unwrap_or(DEFAULT_CACHE_MAX_SIZE_MB);
    let max_size_bytes = mb_to_bytes(max_size_mb).ok_or_else(|| {
        LoadError::invalid("cache.max_size_mb", "value exceeds supported range")
    })?;

    let file_ttl = parse_duration_setting(
        "cache.file_ttl",
        cache.file_ttl.as_deref(),
        DEFAULT_CACHE_FILE_TTL,
    )?;
    let api_ttl = parse_duration_setting(
        "cache.api_ttl",
        cache.api_ttl.as_deref(),
        DEFAULT_CACHE_API_TTL,
    )?;
    let sweep_interval = parse_duration_setting(
        "cache.sweep_interval",
        cache.sweep_interval.as_deref(),
        DEFAULT_CACHE_SWEEP_INTERVAL,
    )?;
    if sweep_interval.is_zero() {
        return Err(LoadError::invalid(
            "cache.sweep_interval",
            "must be greater than zero",
        ));
    }

    let api_excluded_prefixes = cache
        .api_excluded_prefixes
        .unwrap_or_else(|| vec![DEFAULT_CACHE_EXCLUDED_PREFIX.to_string()])
        .into_iter()
        .map(|prefix| prefix.trim().to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect();

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        directory,
        max_size_bytes,
        file_ttl,
        api_ttl,
        cache_log: cache.cache_log.unwrap_or(false),
        hit_log: cache.hit_log.unwrap_or(false),
        api_caching_enabled: cache.api_caching_enabled.unwrap_or(true),
        api_excluded_prefixes,
        sweep_interval,
    })
}

fn build_external_urls(raw: Vec<RawExternalUrl>) -> Result<Vec<ExternalUrlSettings>, LoadError> {
    let mut seen = HashSet::new();
    let mut urls = Vec::with_capacity(raw.len());

    for entry in raw {
        let path = non_empty(entry.path)
            .filter(|path| path.starts_with('/'))
            .ok_or_else(|| {
                LoadError::invalid("external_urls.path", "path must start with `/`")
            })?;
        if !seen.insert(path.clone()) {
            return Err(LoadError::invalid(
                "external_urls.path",
                format!("duplicate path `{path}`"),
            ));
        }

        let main_url = non_empty(entry.main_url)
            .ok_or_else(|| {
                LoadError::invalid("external_urls.main_url", format!("missing for `{path}`"))
            })
            .and_then(|raw| parse_url("external_urls.main_url", &raw))?;
        let backup_urls = entry
            .backup_urls
            .iter()
            .map(|raw| parse_url("external_urls.backup_urls", raw))
            .collect::<Result<Vec<_>, _>>()?;

        let remote_key = entry
            .remote_key
            .map(|key| key.trim().trim_start_matches('/').to_string())
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| path.trim_start_matches('/').to_string());

        // Unparsable refresh intervals fall back to hourly checks.
        let check_interval = entry
            .check_interval
            .as_deref()
            .and_then(|raw| parse_duration(raw).ok())
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_EXTERNAL_CHECK_INTERVAL);

        urls.push(ExternalUrlSettings {
            path,
            main_url,
            backup_urls,
            remote_key,
            cache_control: non_empty(entry.cache_control)
                .unwrap_or_else(|| DEFAULT_EXTERNAL_CACHE_CONTROL.to_string()),
            check_interval,
        });
    }

    Ok(urls)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    enable_api: Option<bool>,
    api_only: Option<bool>,
    legacy_api: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
    access_log: Option<bool>,
    process_log: Option<bool>,
    redirect_log: Option<bool>,
    presign_log: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    endpoint: Option<String>,
    region: Option<String>,
    bucket: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    root: Option<String>,
    use_public_url: Option<bool>,
    presign_ttl: Option<String>,
    max_workers: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGitSettings {
    cache_path: Option<PathBuf>,
    retry_attempts: Option<u64>,
    retry_delay: Option<String>,
    repositories: Vec<RawRepository>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRepository {
    url: Option<String>,
    branch: Option<String>,
    local_path: Option<PathBuf>,
    remote_prefix: Option<String>,
    sync_disabled: Option<bool>,
    check_interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    workers: Option<u64>,
    cadence: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExposedPath {
    url_path: Option<String>,
    remote_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
    max_size_mb: Option<u64>,
    file_ttl: Option<String>,
    api_ttl: Option<String>,
    cache_log: Option<bool>,
    hit_log: Option<bool>,
    api_caching_enabled: Option<bool>,
    api_excluded_prefixes: Option<Vec<String>>,
    sweep_interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExternalUrl {
    path: Option<String>,
    main_url: Option<String>,
    backup_urls: Vec<String>,
    remote_key: Option<String>,
    cache_control: Option<String>,
    check_interval: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, LoadError> {
    Url::parse(raw.trim()).map_err(|err| LoadError::invalid(key, format!("`{raw}`: {err}")))
}

fn parse_duration_setting(
    key: &'static str,
    value: Option<&str>,
    default: &str,
) -> Result<Duration, LoadError> {
    let raw = value.unwrap_or(default);
    parse_duration(raw).map_err(|err| LoadError::invalid(key, format!("`{raw}`: {err}")))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
