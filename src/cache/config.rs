//! Response cache policy.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::config::CacheSettings;

const DEFAULT_DIRECTORY: &str = ".cache/files";
const DEFAULT_MAX_SIZE_BYTES: u64 = 1000 * 1024 * 1024;
const DEFAULT_FILE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_API_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_API_PREFIX: &str = "/api/";
const DEFAULT_EXCLUDED_PREFIX: &str = "/api/files/sync/status";

/// Which TTL governs a cached response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Api,
    File,
}

/// Why a request was not considered for caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    ApiCachingDisabled,
    Excluded,
}

impl BypassReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BypassReason::ApiCachingDisabled => "api_caching_disabled",
            BypassReason::Excluded => "excluded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub max_size_bytes: u64,
    pub file_ttl: Duration,
    pub api_ttl: Duration,
    pub cache_log: bool,
    pub hit_log: bool,
    pub api_caching_enabled: bool,
    pub api_excluded_prefixes: Vec<String>,
    pub api_prefix: String,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            file_ttl: DEFAULT_FILE_TTL,
            api_ttl: DEFAULT_API_TTL,
            cache_log: false,
            hit_log: false,
            api_caching_enabled: true,
            api_excluded_prefixes: vec![DEFAULT_EXCLUDED_PREFIX.to_string()],
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            directory: settings.directory.clone(),
            max_size_bytes: settings.max_size_bytes,
            file_ttl: settings.file_ttl,
            api_ttl: settings.api_ttl,
            cache_log: settings.cache_log,
            hit_log: settings.hit_log,
            api_caching_enabled: settings.api_caching_enabled,
            api_excluded_prefixes: settings.api_excluded_prefixes.clone(),
            sweep_interval: settings.sweep_interval,
            ..Self::default()
        }
    }
}

impl CacheConfig {
    pub fn classify(&self, path: &str) -> RequestClass {
        if path.starts_with(&self.api_prefix) {
            RequestClass::Api
        } else {
            RequestClass::File
        }
    }

    pub fn ttl_for(&self, class: RequestClass) -> Duration {
        match class {
            RequestClass::Api => self.api_ttl,
            RequestClass::File => self.file_ttl,
        }
    }

    /// `Some` when `path` must always reach the handler.
    pub fn bypass_reason(&self, path: &str) -> Option<BypassReason> {
        if self
            .api_excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Some(BypassReason::Excluded);
        }
        if !self.api_caching_enabled && self.classify(path) == RequestClass::Api {
            return Some(BypassReason::ApiCachingDisabled);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_api_prefix() {
        let config = CacheConfig::default();
        assert_eq!(config.classify("/api/files/docs"), RequestClass::Api);
        assert_eq!(config.classify("/docs/index.html"), RequestClass::File);
        assert_eq!(config.ttl_for(RequestClass::Api), DEFAULT_API_TTL);
        assert_eq!(config.ttl_for(RequestClass::File), DEFAULT_FILE_TTL);
    }

    #[test]
    fn sync_status_is_excluded_by_default() {
        let config = CacheConfig::default();
        assert_eq!(
            config.bypass_reason("/api/files/sync/status"),
            Some(BypassReason::Excluded)
        );
        assert_eq!(config.bypass_reason("/api/files/docs"), None);
    }

    #[test]
    fn disabling_api_caching_bypasses_only_api_paths() {
        let config = CacheConfig {
            api_caching_enabled: false,
            ..CacheConfig::default()
        };
        assert_eq!(
            config.bypass_reason("/api/files/docs"),
            Some(BypassReason::ApiCachingDisabled)
        );
        assert_eq!(config.bypass_reason("/docs/a.txt"), None);
    }
}
