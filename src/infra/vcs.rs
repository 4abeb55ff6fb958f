//! Version control client used to refresh working trees before a sync.

use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to spawn `git {command}`: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("`git {command}` failed ({status}): {stderr}")]
    Failed {
        command: &'static str,
        status: String,
        stderr: String,
    },
    #[error("failed to prepare `{path}`: {source}")]
    Prepare {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Operations the sync engine needs from a version control system.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Clone `branch` of `url` into `dest` with a history depth of one.
    async fn clone_shallow(&self, url: &str, branch: &str, dest: &Path) -> Result<(), VcsError>;

    /// Fetch the tip of `branch` into the existing tree at `dest` with depth one.
    async fn fetch_shallow(&self, dest: &Path, branch: &str) -> Result<(), VcsError>;

    /// Hard-reset the tree at `dest` to the fetched tip of `branch`.
    async fn reset_hard(&self, dest: &Path, branch: &str) -> Result<(), VcsError>;
}

/// Shells out to the system `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, command: &'static str, mut cmd: Command) -> Result<(), VcsError> {
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(target = "docmirror::vcs", command, "spawning git");

        let output = cmd
            .output()
            .await
            .map_err(|source| VcsError::Spawn { command, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::Failed {
                command,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VcsClient for GitCli {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn clone_shallow(&self, url: &str, branch: &str, dest: &Path) -> Result<(), VcsError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| VcsError::Prepare {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--single-branch")
            .arg("--branch")
            .arg(branch)
            .arg(url)
            .arg(dest);
        self.run("clone", cmd).await
    }

    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn fetch_shallow(&self, dest: &Path, branch: &str) -> Result<(), VcsError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C")
            .arg(dest)
            .arg("fetch")
            .arg("--depth")
            .arg("1")
            .arg("origin")
            .arg(branch);
        self.run("fetch", cmd).await
    }

    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn reset_hard(&self, dest: &Path, branch: &str) -> Result<(), VcsError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C")
            .arg(dest)
            .arg("reset")
            .arg("--hard")
            .arg(format!("origin/{branch}"));
        self.run("reset", cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_spawn_error() {
        let git = GitCli::with_program("docmirror-definitely-not-git");
        let dir = tempfile::tempdir().expect("tempdir");

        let err = git
            .fetch_shallow(dir.path(), "main")
            .await
            .expect_err("spawn should fail");

        assert!(matches!(err, VcsError::Spawn { command: "fetch", .. }));
    }
}
