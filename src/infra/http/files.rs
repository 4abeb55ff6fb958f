//! File serving from the object store.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION},
    },
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::{
    application::{error::HttpError, mirror::MirrorError},
    infra::storage::StoredObject,
};

use super::AppState;

/// Object key for a request path, or `None` when the path is not served.
///
/// Repository prefixes and exposed remote prefixes map one to one; an exposed
/// `url_path` is rewritten onto its remote prefix.
pub fn resolve_key(state: &AppState, path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');
    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() {
        return None;
    }

    if state
        .repositories
        .iter()
        .any(|repo| repo.remote_prefix == first)
    {
        return Some(path.to_string());
    }

    for exposed in state.exposed_paths.iter() {
        let rest = path
            .strip_prefix(exposed.url_path.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'));
        if let Some(rest) = rest {
            return Some(format!("{}{}", exposed.remote_prefix, rest));
        }
        if exposed.remote_prefix == first {
            return Some(path.to_string());
        }
    }

    None
}

pub async fn serve_file(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::files::serve_file";

    let Some(key) = resolve_key(&state, &path) else {
        return HttpError::new(
            SOURCE,
            StatusCode::FORBIDDEN,
            "Forbidden",
            format!("`/{path}` is outside every served prefix"),
        )
        .into_response();
    };

    if state.options.use_public_url {
        match state
            .store
            .presigned_get_url(&key, state.options.presign_ttl)
            .await
        {
            Ok(url) => {
                if state.options.redirect_log {
                    info!(target = "docmirror::http::redirect", key = %key, "redirecting to presigned url");
                }
                return redirect(StatusCode::FOUND, &url);
            }
            Err(err) => {
                warn!(target = SOURCE, key = %key, error = %err, "presign failed, proxying object");
            }
        }
    }

    match state.store.get_object(&key).await {
        Ok(Some(object)) => object_response(object, None),
        Ok(None) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            format!("no object stored at `{key}`"),
        )
        .into_response(),
        Err(err) => {
            error!(target = SOURCE, key = %key, error = %err, "failed to read object");
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read file",
                &err,
            )
            .into_response()
        }
    }
}

pub async fn legacy_redirect(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    uri: Uri,
) -> Response {
    let target = match uri.query() {
        Some(query) => format!("/{rest}?{query}"),
        None => format!("/{rest}"),
    };
    if state.options.redirect_log {
        info!(target = "docmirror::http::redirect", from = %uri.path(), to = %target, "legacy redirect");
    }
    redirect(StatusCode::MOVED_PERMANENTLY, &target)
}

pub async fn serve_external(State(state): State<AppState>, uri: Uri) -> Response {
    const SOURCE: &str = "infra::http::files::serve_external";

    let Some(mirror) = state.mirror.as_ref() else {
        return HttpError::new(SOURCE, StatusCode::NOT_FOUND, "File not found", "mirroring is off")
            .into_response();
    };
    let path = uri.path();
    let cache_control = mirror.entry(path).map(|entry| entry.cache_control.clone());

    match mirror.fetch(path).await {
        Ok(Some(object)) => object_response(object, cache_control),
        Ok(None) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            format!("`{path}` has not been mirrored yet"),
        )
        .into_response(),
        Err(MirrorError::UnknownPath(path)) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            format!("no external url configured for `{path}`"),
        )
        .into_response(),
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::BAD_GATEWAY,
            "Failed to read mirrored file",
            &err,
        )
        .into_response(),
    }
}

fn object_response(object: StoredObject, cache_control: Option<String>) -> Response {
    let mut response = Response::new(Body::from(object.body));
    let headers = response.headers_mut();

    let content_type = object
        .content_type
        .unwrap_or_else(|| mime_guess::mime::APPLICATION_OCTET_STREAM.to_string());
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Some(value) = cache_control
        .or(object.cache_control)
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        headers.insert(CACHE_CONTROL, value);
    }

    response
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(LOCATION, value)]).into_response(),
        Err(err) => HttpError::new(
            "infra::http::files::redirect",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid redirect target",
            err.to_string(),
        )
        .into_response(),
    }
}
