use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the docmirror binary.
#[derive(Debug, Parser)]
#[command(
    name = "docmirror",
    version,
    about = "Mirror git repositories into object storage and serve them over HTTP"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DOCMIRROR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server together with the sync scheduler.
    Serve(Box<ServeArgs>),
    /// Force one sync cycle of every enabled repository, then exit.
    Sync(SyncArgs),
    /// Force one sync cycle of the repository mirrored under PREFIX, then exit.
    Rsync(RsyncArgs),
    /// Delete the response cache directory, then exit.
    #[command(name = "clear-cache")]
    ClearCache(ClearCacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,

    /// Record every repository as just synced instead of syncing at startup.
    #[arg(long = "skip-initial-sync", action = clap::ArgAction::SetTrue)]
    pub skip_initial_sync: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LogOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub log: LogOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the response cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,

    /// Override the number of concurrent uploads per sync cycle.
    #[arg(long = "storage-max-workers", value_name = "COUNT")]
    pub storage_max_workers: Option<u64>,

    /// Override the number of repositories synced in parallel.
    #[arg(long = "scheduler-workers", value_name = "COUNT")]
    pub scheduler_workers: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub log: LogOverrides,

    /// Override the number of concurrent uploads per sync cycle.
    #[arg(long = "storage-max-workers", value_name = "COUNT")]
    pub storage_max_workers: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct RsyncArgs {
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Remote prefix of the repository to sync.
    #[arg(value_name = "PREFIX")]
    pub prefix: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClearCacheArgs {
    /// Override the response cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,
}
