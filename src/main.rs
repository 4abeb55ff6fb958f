use std::{process, sync::Arc};

use docmirror::{
    application::{
        error::AppError,
        mirror::ExternalMirror,
        sync::{
            SyncEngine, SyncEngineConfig, SyncMode, SyncOutcome, SyncRegistry, SyncScheduler,
            sync_all,
        },
    },
    cache::{CacheConfig, CacheState, DiskCache, spawn_sweeper},
    config::{self, Command, RsyncArgs, ServeArgs, Settings},
    infra::{
        error::InfraError,
        http::{self, AppState, HttpOptions},
        storage::{RemoteStore, build_store},
        telemetry,
        vcs::GitCli,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        Command::Serve(args) => run_serve(settings, *args).await,
        Command::Sync(_) => run_sync(settings).await,
        Command::Rsync(args) => run_rsync(settings, args).await,
        Command::ClearCache(_) => run_clear_cache(settings).await,
    }
}

async fn init_store(settings: &Settings) -> Result<Arc<dyn RemoteStore>, AppError> {
    let store = build_store(&settings.storage)?;
    store.ensure_ready().await?;
    info!(
        target = "docmirror::storage",
        backend = %store.describe(),
        "object store ready"
    );
    Ok(store)
}

async fn build_engine(
    settings: &Settings,
    store: Arc<dyn RemoteStore>,
) -> Result<Arc<SyncEngine>, AppError> {
    tokio::fs::create_dir_all(&settings.git.cache_path)
        .await
        .map_err(|err| InfraError::directory(&settings.git.cache_path, err))?;

    Ok(Arc::new(SyncEngine::new(
        store,
        Arc::new(GitCli::new()),
        Arc::new(SyncRegistry::new()),
        SyncEngineConfig::from_settings(settings),
    )))
}

async fn run_serve(settings: Settings, args: ServeArgs) -> Result<(), AppError> {
    let store = init_store(&settings).await?;

    let cache = if settings.cache.enabled {
        let state = CacheState::new(CacheConfig::from(&settings.cache));
        state.store.ensure_directory().await?;
        Some(state)
    } else {
        None
    };

    let engine = build_engine(&settings, store.clone()).await?;
    let scheduler = Arc::new(SyncScheduler::start(engine.clone(), settings.scheduler.workers));
    let repositories = settings.git.repositories.clone();

    let initial_handle = if args.skip_initial_sync {
        scheduler.mark_all_triggered(&repositories);
        info!(target = "docmirror::scheduler", "initial sync skipped");
        None
    } else {
        let scheduler = scheduler.clone();
        let repositories = repositories.clone();
        Some(tokio::spawn(async move {
            scheduler.enqueue_due(&repositories).await;
        }))
    };

    let trigger_handle =
        scheduler.spawn_trigger_loop(repositories.clone(), settings.scheduler.cadence);

    let sweeper_handle = cache.as_ref().map(|state| {
        spawn_sweeper(
            state.store.clone(),
            settings.cache.sweep_interval,
            settings.cache.max_size_bytes,
        )
    });

    let mirror = if settings.external_urls.is_empty() {
        None
    } else {
        let mirror = Arc::new(ExternalMirror::new(
            store.clone(),
            settings.external_urls.clone(),
        )?);
        let warm = mirror.clone();
        tokio::spawn(async move { warm.warm_all().await });
        Some(mirror)
    };

    let state = AppState {
        store,
        registry: engine.registry().clone(),
        repositories: repositories.into(),
        exposed_paths: settings.exposed_paths.clone().into(),
        mirror,
        options: HttpOptions::from_settings(&settings),
    };
    let router = http::build_router(state, cache);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| InfraError::bind(settings.server.addr, err))?;
    info!(target = "docmirror::http", addr = %settings.server.addr, "listening");

    let result = axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    trigger_handle.abort();
    let _ = trigger_handle.await;
    if let Some(handle) = initial_handle {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(handle) = sweeper_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_sync(settings: Settings) -> Result<(), AppError> {
    let store = init_store(&settings).await?;
    let engine = build_engine(&settings, store).await?;

    let repositories: Vec<_> = settings
        .git
        .repositories
        .iter()
        .filter(|repo| !repo.sync_disabled)
        .cloned()
        .collect();

    let failures = sync_all(&engine, &repositories, settings.scheduler.workers).await;
    if failures.is_empty() {
        return Ok(());
    }

    for (prefix, err) in &failures {
        warn!(target = "docmirror::sync", remote_prefix = %prefix, error = %err, "sync failed");
    }
    let prefixes: Vec<&str> = failures.iter().map(|(prefix, _)| prefix.as_str()).collect();
    Err(AppError::unexpected(format!(
        "sync failed for: {}",
        prefixes.join(", ")
    )))
}

async fn run_rsync(settings: Settings, args: RsyncArgs) -> Result<(), AppError> {
    let prefix = args.prefix.trim_matches('/');
    let repo = settings
        .repository(prefix)
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("no repository mirrored under `{prefix}`")))?;

    let store = init_store(&settings).await?;
    let engine = build_engine(&settings, store).await?;

    match engine.sync(&repo, SyncMode::Forced).await? {
        SyncOutcome::Completed(report) => {
            info!(
                target = "docmirror::sync",
                remote_prefix = %repo.remote_prefix,
                uploaded = report.uploaded,
                unchanged = report.unchanged,
                deleted = report.deleted,
                failed = report.failed,
                "rsync finished"
            );
        }
        SyncOutcome::Skipped => {}
    }
    Ok(())
}

async fn run_clear_cache(settings: Settings) -> Result<(), AppError> {
    let cache = DiskCache::new(
        settings.cache.directory.clone(),
        settings.cache.file_ttl,
        settings.cache.api_ttl,
    );
    cache.clear().await?;
    info!(
        target = "docmirror::cache",
        directory = %cache.directory().display(),
        "cache cleared"
    );
    Ok(())
}
