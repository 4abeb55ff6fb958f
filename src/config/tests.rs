use super::*;

fn repository(url: &str, prefix: &str) -> RawRepository {
    RawRepository {
        url: Some(url.to_string()),
        remote_prefix: Some(prefix.to_string()),
        ..Default::default()
    }
}

#[test]
fn defaults_match_reference_deployment() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.storage.backend, StorageBackend::S3);
    assert_eq!(settings.storage.max_workers.get(), 16);
    assert_eq!(settings.storage.presign_ttl, Duration::from_secs(3600));
    assert_eq!(settings.git.retry_attempts.get(), 3);
    assert_eq!(settings.git.retry_delay, Duration::from_secs(2));
    assert_eq!(settings.scheduler.workers.get(), 2);
    assert_eq!(settings.scheduler.cadence, Duration::from_secs(600));
    assert_eq!(settings.cache.max_size_bytes, 1000 * 1024 * 1024);
    assert_eq!(settings.cache.file_ttl, Duration::from_secs(30 * 86_400));
    assert_eq!(settings.cache.api_ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.sweep_interval, Duration::from_secs(900));
    assert_eq!(
        settings.cache.api_excluded_prefixes,
        vec!["/api/files/sync/status".to_string()]
    );
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log: LogOverrides {
            log_level: Some("debug".to_string()),
            log_json: Some(true),
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_upload_workers_fall_back_to_one() {
    let mut raw = RawSettings::default();
    raw.storage.max_workers = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.storage.max_workers.get(), 1);
}

#[test]
fn repositories_are_normalised_and_kept_distinct() {
    let mut raw = RawSettings::default();
    let mut docs = repository("https://example.com/docs.git", "/docs/");
    docs.branch = Some("stable".to_string());
    docs.check_interval = Some("30m".to_string());
    raw.git.repositories = vec![docs, repository("https://example.com/blog.git", "blog")];

    let settings = Settings::from_raw(raw).expect("valid settings");
    let repos = &settings.git.repositories;

    assert_eq!(repos.len(), 2);
    assert_eq!(repos[0].remote_prefix, "docs");
    assert_eq!(repos[0].branch, "stable");
    assert_eq!(repos[0].local_subpath, PathBuf::from("docs"));
    assert_eq!(repos[0].check_interval(), Duration::from_secs(1800));
    assert_eq!(repos[1].remote_prefix, "blog");
    assert_eq!(repos[1].branch, "main");
    assert_eq!(repos[1].remote_url, "https://example.com/blog.git");
    assert!(settings.repository("/blog").is_some());
}

#[test]
fn duplicate_repository_prefixes_are_rejected() {
    let mut raw = RawSettings::default();
    raw.git.repositories = vec![
        repository("https://example.com/a.git", "docs"),
        repository("https://example.com/b.git", "docs/"),
    ];

    let err = Settings::from_raw(raw).expect_err("duplicate prefix");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "git.repositories",
            ..
        }
    ));
}

#[test]
fn local_paths_escaping_the_git_cache_are_rejected() {
    for local_path in [".", "../../etc", "docs/../..", "/srv/docs", "./docs"] {
        let mut raw = RawSettings::default();
        raw.git.repositories = vec![RawRepository {
            local_path: Some(PathBuf::from(local_path)),
            ..repository("https://example.com/docs.git", "docs")
        }];

        let err = Settings::from_raw(raw).expect_err(local_path);
        assert!(
            matches!(
                err,
                LoadError::Invalid {
                    key: "git.repositories.local_path",
                    ..
                }
            ),
            "`{local_path}` should be rejected"
        );
    }
}

#[test]
fn overlapping_local_paths_are_rejected() {
    for (first, second) in [("shared", "shared"), ("shared", "shared/nested")] {
        let mut raw = RawSettings::default();
        raw.git.repositories = vec![
            RawRepository {
                local_path: Some(PathBuf::from(first)),
                ..repository("https://example.com/a.git", "a")
            },
            RawRepository {
                local_path: Some(PathBuf::from(second)),
                ..repository("https://example.com/b.git", "b")
            },
        ];

        let err = Settings::from_raw(raw).expect_err("overlapping local paths");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "git.repositories.local_path",
                ..
            }
        ));
    }
}

#[test]
fn invalid_cache_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.file_ttl = Some("forever".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.file_ttl",
            ..
        }
    ));
}

#[test]
fn external_urls_default_interval_and_key() {
    let mut raw = RawSettings::default();
    raw.external_urls = vec![RawExternalUrl {
        path: Some("/external/logo.png".to_string()),
        main_url: Some("https://cdn.example.com/logo.png".to_string()),
        backup_urls: vec!["https://mirror.example.com/logo.png".to_string()],
        check_interval: Some("whenever".to_string()),
        ..Default::default()
    }];

    let settings = Settings::from_raw(raw).expect("valid settings");
    let external = &settings.external_urls[0];

    assert_eq!(external.remote_key, "external/logo.png");
    assert_eq!(external.check_interval, Duration::from_secs(3600));
    assert_eq!(external.backup_urls.len(), 1);
}

#[test]
fn unknown_storage_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.storage.backend = Some("ftp".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["docmirror"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "docmirror",
        "serve",
        "--skip-initial-sync",
        "--server-host",
        "0.0.0.0",
        "--cache-enabled",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert!(serve.skip_initial_sync);
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_rsync_arguments() {
    let args = CliArgs::parse_from([
        "docmirror",
        "rsync",
        "--storage-max-workers",
        "4",
        "docs",
    ]);

    match args.command.expect("rsync command") {
        Command::Rsync(rsync) => {
            assert_eq!(rsync.prefix, "docs");
            assert_eq!(rsync.sync.storage_max_workers, Some(4));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_clear_cache_arguments() {
    let args = CliArgs::parse_from([
        "docmirror",
        "clear-cache",
        "--cache-directory",
        "/tmp/docmirror-cache",
    ]);

    match args.command.expect("clear-cache command") {
        Command::ClearCache(clear) => {
            assert_eq!(
                clear.cache_directory.as_deref(),
                Some(std::path::Path::new("/tmp/docmirror-cache"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
