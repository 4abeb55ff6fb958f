use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use bytes::Bytes;
use docmirror::{
    application::sync::SyncRegistry,
    domain::repository::{ExposedPath, RepositorySpec},
    infra::{
        http::{AppState, HttpOptions, build_router},
        storage::{MemoryStore, ObjectMetadata, RemoteStore},
    },
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

fn repository(prefix: &str) -> RepositorySpec {
    RepositorySpec {
        remote_url: format!("https://example.com/{prefix}.git"),
        branch: "main".to_string(),
        local_subpath: PathBuf::from(prefix),
        remote_prefix: prefix.to_string(),
        sync_disabled: false,
        check_interval: None,
    }
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (key, body) in [
        ("docs/index.md", "# index"),
        ("docs/guide/intro.md", "intro"),
        ("docs/guide/setup.md", "setup"),
        ("docs/a.txt", "A"),
        ("public-data/logo.svg", "<svg/>"),
    ] {
        store
            .put_object(
                key,
                Bytes::from(body.to_string()),
                ObjectMetadata {
                    content_type: Some(
                        mime_guess::from_path(key)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string(),
                    ),
                    ..ObjectMetadata::default()
                },
            )
            .await
            .expect("seed");
    }
    store
}

struct TestApp {
    router: Router,
    registry: Arc<SyncRegistry>,
}

async fn app(options: HttpOptions) -> TestApp {
    let store = seeded_store().await;
    let registry = Arc::new(SyncRegistry::new());
    let state = AppState {
        store,
        registry: registry.clone(),
        repositories: vec![repository("docs")].into(),
        exposed_paths: vec![ExposedPath {
            url_path: "assets".to_string(),
            remote_prefix: "public-data".to_string(),
        }]
        .into(),
        mirror: None,
        options,
    };
    TestApp {
        router: build_router(state, None),
        registry,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    (status, headers, body)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(router, uri).await;
    let json = serde_json::from_slice(&body).expect("json body");
    (status, json)
}

#[tokio::test]
async fn listing_returns_immediate_children() {
    let test = app(HttpOptions::default()).await;

    let (status, json) = get_json(&test.router, "/api/files/docs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], 200);
    assert_eq!(json["message"], "success");
    let names: Vec<(&str, bool)> = json["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|entry| {
            (
                entry["name"].as_str().expect("name"),
                entry["isDirectory"].as_bool().expect("isDirectory"),
            )
        })
        .collect();
    assert_eq!(
        names,
        vec![("a.txt", false), ("guide", true), ("index.md", false)]
    );
    assert_eq!(json["pagination"]["total"], 3);
    assert_eq!(json["pagination"]["pageSize"], 20);
    assert!(json["data"][0].get("url").is_none());
}

#[tokio::test]
async fn listing_paginates() {
    let test = app(HttpOptions::default()).await;

    let (_, json) = get_json(&test.router, "/api/files/docs/?page=2&pageSize=2").await;

    assert_eq!(json["pagination"]["current"], 2);
    assert_eq!(json["pagination"]["pageSize"], 2);
    assert_eq!(json["data"].as_array().expect("data").len(), 1);
    assert_eq!(json["data"][0]["path"], "docs/index.md");
}

#[tokio::test]
async fn listing_carries_presigned_urls_when_public() {
    let test = app(HttpOptions {
        use_public_url: true,
        ..HttpOptions::default()
    })
    .await;

    let (_, json) = get_json(&test.router, "/api/files/docs/guide").await;

    assert_eq!(
        json["data"][0]["url"],
        "memory:///docs/guide/intro.md?expires_in=3600"
    );
}

#[tokio::test]
async fn sync_status_lists_every_repository() {
    let test = app(HttpOptions::default()).await;

    let (_, json) = get_json(&test.router, "/api/files/sync/status").await;
    assert_eq!(json["data"]["docs"]["status"], "unknown");

    test.registry.update_status("docs", |status| {
        status.begin_cycle(None);
        status.record_progress(1, 4);
    });
    let (_, json) = get_json(&test.router, "/api/files/sync/status").await;

    assert_eq!(json["data"]["docs"]["status"], "syncing");
    assert_eq!(json["data"]["docs"]["progress"], 25.0);
    assert_eq!(json["data"]["docs"]["totalFiles"], 4);
    assert_eq!(json["data"]["docs"]["currentFiles"], 1);
}

#[tokio::test]
async fn files_outside_served_prefixes_are_forbidden() {
    let test = app(HttpOptions::default()).await;

    let (status, _, _) = get(&test.router, "/secret/a.txt").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn files_are_proxied_with_content_type() {
    let test = app(HttpOptions::default()).await;

    let (status, headers, body) = get(&test.router, "/docs/a.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"A"));
    assert_eq!(
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/plain")
    );

    let (status, _, _) = get(&test.router, "/docs/missing.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exposed_paths_map_onto_their_remote_prefix() {
    let test = app(HttpOptions::default()).await;

    let (status, _, body) = get(&test.router, "/assets/logo.svg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"<svg/>"));
}

#[tokio::test]
async fn public_url_mode_redirects_to_presigned_url() {
    let test = app(HttpOptions {
        use_public_url: true,
        ..HttpOptions::default()
    })
    .await;

    let (status, headers, _) = get(&test.router, "/docs/a.txt").await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        headers.get(header::LOCATION).and_then(|v| v.to_str().ok()),
        Some("memory:///docs/a.txt?expires_in=3600")
    );
}

#[tokio::test]
async fn legacy_paths_redirect_permanently() {
    let test = app(HttpOptions {
        legacy_api: true,
        ..HttpOptions::default()
    })
    .await;

    let (status, headers, _) = get(&test.router, "/files/docs/a.txt?v=1").await;

    assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        headers.get(header::LOCATION).and_then(|v| v.to_str().ok()),
        Some("/docs/a.txt?v=1")
    );
}

#[tokio::test]
async fn route_toggles_remove_surfaces() {
    let api_only = app(HttpOptions {
        api_only: true,
        ..HttpOptions::default()
    })
    .await;
    let (status, _, _) = get(&api_only.router, "/docs/a.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let files_only = app(HttpOptions {
        enable_api: false,
        ..HttpOptions::default()
    })
    .await;
    let (status, _, _) = get(&files_only.router, "/api/files/docs").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
