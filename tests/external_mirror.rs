use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use docmirror::{
    application::mirror::{ExternalMirror, MirrorError},
    config::ExternalUrlSettings,
    infra::storage::{MemoryStore, RemoteStore},
};
use url::Url;

async fn spawn_origin(calls: Arc<AtomicUsize>) -> SocketAddr {
    let app = Router::new()
        .route(
            "/main/logo.png",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
        )
        .route(
            "/backup/logo.png",
            get(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "png-bytes"
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("origin server");
    });
    addr
}

fn entry(addr: SocketAddr, check_interval: Duration) -> ExternalUrlSettings {
    let base = format!("http://{addr}");
    ExternalUrlSettings {
        path: "/external/logo.png".to_string(),
        main_url: Url::parse(&format!("{base}/main/logo.png")).expect("main url"),
        backup_urls: vec![Url::parse(&format!("{base}/backup/logo.png")).expect("backup url")],
        remote_key: "external/logo.png".to_string(),
        cache_control: "public, max-age=86400".to_string(),
        check_interval,
    }
}

#[tokio::test]
async fn falls_back_to_backup_and_stores_with_cache_control() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = spawn_origin(calls.clone()).await;
    let store = Arc::new(MemoryStore::new());
    let mirror = ExternalMirror::new(store.clone(), vec![entry(addr, Duration::from_secs(600))])
        .expect("mirror");

    let object = mirror
        .fetch("/external/logo.png")
        .await
        .expect("fetch")
        .expect("stored copy");

    assert_eq!(object.body.as_ref(), b"png-bytes");
    assert_eq!(object.content_type.as_deref(), Some("image/png"));
    assert_eq!(object.cache_control.as_deref(), Some("public, max-age=86400"));
    assert!(
        store
            .get_object("external/logo.png")
            .await
            .expect("get")
            .is_some()
    );

    mirror.fetch("/external/logo.png").await.expect("second fetch");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_first_requests_download_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = spawn_origin(calls.clone()).await;
    let store = Arc::new(MemoryStore::new());
    let mirror = ExternalMirror::new(store, vec![entry(addr, Duration::from_secs(600))])
        .expect("mirror");

    let (first, second, third) = tokio::join!(
        mirror.fetch("/external/logo.png"),
        mirror.fetch("/external/logo.png"),
        mirror.fetch("/external/logo.png"),
    );
    for result in [first, second, third] {
        result.expect("fetch");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn elapsed_interval_triggers_a_new_download() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = spawn_origin(calls.clone()).await;
    let store = Arc::new(MemoryStore::new());
    let mirror =
        ExternalMirror::new(store, vec![entry(addr, Duration::ZERO)]).expect("mirror");

    mirror.warm_all().await;
    mirror.fetch("/external/logo.png").await.expect("fetch");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_paths_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mirror = ExternalMirror::new(store, Vec::new()).expect("mirror");

    let err = mirror
        .fetch("/external/missing.png")
        .await
        .expect_err("unknown path");

    assert!(matches!(err, MirrorError::UnknownPath(path) if path == "/external/missing.png"));
}

#[tokio::test]
async fn unreachable_sources_leave_nothing_stored() {
    let store = Arc::new(MemoryStore::new());
    let dead = ExternalUrlSettings {
        path: "/external/dead.txt".to_string(),
        main_url: Url::parse("http://127.0.0.1:9/dead.txt").expect("url"),
        backup_urls: Vec::new(),
        remote_key: "external/dead.txt".to_string(),
        cache_control: "no-cache".to_string(),
        check_interval: Duration::from_secs(600),
    };
    let mirror = ExternalMirror::new(store, vec![dead.clone()]).expect("mirror");

    let err = mirror.refresh(&dead).await.expect_err("download fails");
    assert!(matches!(err, MirrorError::Download { .. }));

    let stored = mirror.fetch("/external/dead.txt").await.expect("fetch");
    assert!(stored.is_none());
}
