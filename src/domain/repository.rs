use std::{path::PathBuf, time::Duration};

use tracing::warn;

use crate::util::duration::parse_duration;

/// Interval used when a repository has no usable `check_interval`.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// A git repository mirrored under a remote key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub remote_url: String,
    pub branch: String,
    /// Working tree location, relative to the git cache root.
    pub local_subpath: PathBuf,
    /// Key namespace in the object store, without leading or trailing `/`.
    pub remote_prefix: String,
    pub sync_disabled: bool,
    pub check_interval: Option<String>,
}

impl RepositorySpec {
    /// Resolve the configured check interval, defaulting to ten minutes.
    pub fn check_interval(&self) -> Duration {
        let Some(raw) = self.check_interval.as_deref() else {
            return DEFAULT_CHECK_INTERVAL;
        };

        match parse_duration(raw) {
            Ok(interval) if !interval.is_zero() => interval,
            Ok(_) => DEFAULT_CHECK_INTERVAL,
            Err(err) => {
                warn!(
                    target = "docmirror::sync",
                    remote_prefix = %self.remote_prefix,
                    check_interval = raw,
                    error = %err,
                    "invalid check interval, using default"
                );
                DEFAULT_CHECK_INTERVAL
            }
        }
    }
}

/// An extra URL prefix allowed to serve objects from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPath {
    pub url_path: String,
    pub remote_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(check_interval: Option<&str>) -> RepositorySpec {
        RepositorySpec {
            remote_url: "https://example.com/docs.git".to_string(),
            branch: "main".to_string(),
            local_subpath: PathBuf::from("docs"),
            remote_prefix: "docs".to_string(),
            sync_disabled: false,
            check_interval: check_interval.map(str::to_string),
        }
    }

    #[test]
    fn check_interval_defaults_to_ten_minutes() {
        assert_eq!(spec(None).check_interval(), DEFAULT_CHECK_INTERVAL);
        assert_eq!(spec(Some("later")).check_interval(), DEFAULT_CHECK_INTERVAL);
        assert_eq!(spec(Some("0s")).check_interval(), DEFAULT_CHECK_INTERVAL);
    }

    #[test]
    fn check_interval_uses_configured_value() {
        assert_eq!(
            spec(Some("1h")).check_interval(),
            Duration::from_secs(3600)
        );
    }
}
