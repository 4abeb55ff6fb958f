use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Level, debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tag the request with an id, reusing a sane inbound `x-request-id` so ids
/// survive a fronting proxy, and echo it on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

fn request_id(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default()
}

/// One line per request, enabled by `logging.access_log`.
pub async fn log_access(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request_id(&request);
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        target = "docmirror::http::access",
        status = response.status().as_u16(),
        method = %method,
        path = %uri.path(),
        query = uri.query().unwrap_or(""),
        elapsed_ms = start.elapsed().as_millis() as u64,
        request_id = request_id,
        "request served"
    );
    response
}

/// Level for a failed response. Missing files are routine for a mirror and
/// stay at debug.
fn failure_level(status: StatusCode) -> Option<Level> {
    if status.is_server_error() {
        Some(Level::ERROR)
    } else if status == StatusCode::NOT_FOUND {
        Some(Level::DEBUG)
    } else if status.is_client_error() {
        Some(Level::WARN)
    } else {
        None
    }
}

/// Log 4xx/5xx responses with the `ErrorReport` the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let request_id = request_id(&request);

    let mut response = next.run(request).await;
    let status = response.status();
    let Some(level) = failure_level(status) else {
        return response;
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());

    macro_rules! emit {
        ($event:ident, $message:literal) => {
            $event!(
                target = "docmirror::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms,
                source,
                detail = %detail,
                chain = ?messages,
                request_id = %request_id,
                $message
            )
        };
    }

    match level {
        Level::ERROR => emit!(error, "request failed"),
        Level::WARN => emit!(warn, "client request error"),
        _ => emit!(debug, "not found"),
    }

    response
}
