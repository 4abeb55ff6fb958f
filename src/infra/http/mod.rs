pub mod api;
pub mod files;
mod middleware;

use std::{sync::Arc, time::Duration};

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::{
    application::{mirror::ExternalMirror, sync::SyncRegistry},
    cache::{CacheState, response_cache_layer},
    config::Settings,
    domain::repository::{ExposedPath, RepositorySpec},
    infra::storage::RemoteStore,
};

pub use middleware::RequestContext;

/// Route toggles and logging switches for the HTTP surface.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub enable_api: bool,
    pub api_only: bool,
    pub legacy_api: bool,
    pub use_public_url: bool,
    pub presign_ttl: Duration,
    pub access_log: bool,
    pub redirect_log: bool,
    pub presign_log: bool,
}

impl HttpOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enable_api: settings.server.enable_api,
            api_only: settings.server.api_only,
            legacy_api: settings.server.legacy_api,
            use_public_url: settings.storage.use_public_url,
            presign_ttl: settings.storage.presign_ttl,
            access_log: settings.logging.access_log,
            redirect_log: settings.logging.redirect_log,
            presign_log: settings.logging.presign_log,
        }
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            enable_api: true,
            api_only: false,
            legacy_api: false,
            use_public_url: false,
            presign_ttl: Duration::from_secs(3600),
            access_log: false,
            redirect_log: false,
            presign_log: false,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RemoteStore>,
    pub registry: Arc<SyncRegistry>,
    pub repositories: Arc<[RepositorySpec]>,
    pub exposed_paths: Arc<[ExposedPath]>,
    pub mirror: Option<Arc<ExternalMirror>>,
    pub options: HttpOptions,
}

pub fn build_router(state: AppState, cache: Option<CacheState>) -> Router {
    let options = state.options.clone();
    let mut routes = Router::new();

    if options.enable_api {
        routes = routes
            .route("/api/files/sync/status", get(api::sync_status))
            .route("/api/files", get(api::list_root))
            .route("/api/files/", get(api::list_root))
            .route("/api/files/{*prefix}", get(api::list_files));
    }

    if !options.api_only {
        if let Some(mirror) = state.mirror.as_ref() {
            for entry in mirror.entries() {
                routes = routes.route(&entry.path, get(files::serve_external));
            }
        }
        if options.legacy_api {
            routes = routes.route("/files/{*rest}", get(files::legacy_redirect));
        }
        routes = routes.route("/{*path}", get(files::serve_file));
    }

    let mut router = routes.with_state(state);

    if let Some(cache_state) = cache {
        router = router.layer(axum_middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ));
    }
    if options.access_log {
        router = router.layer(axum_middleware::from_fn(middleware::log_access));
    }

    router
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
