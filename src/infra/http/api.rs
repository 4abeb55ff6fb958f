//! JSON API: directory listings and sync status.

use std::collections::{BTreeMap, HashSet};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, error, warn};

use crate::{
    application::error::ErrorReport,
    domain::sync::SyncStatus,
    infra::storage::{ObjectInfo, StorageError},
};

use super::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, pagination: Option<Pagination>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "success".to_string(),
            data: Some(data),
            pagination,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: usize,
    pub page_size: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusView {
    pub last_sync: Option<String>,
    pub next_sync: Option<String>,
    pub progress: f64,
    pub total_files: u64,
    pub current_files: u64,
    pub status: &'static str,
    pub error: Option<String>,
}

impl From<&SyncStatus> for SyncStatusView {
    fn from(status: &SyncStatus) -> Self {
        Self {
            last_sync: status.last_sync_time.and_then(format_timestamp),
            next_sync: status.next_sync_time.and_then(format_timestamp),
            progress: status.progress_percent,
            total_files: status.total_files,
            current_files: status.current_files,
            status: status.state.as_str(),
            error: status.last_error.clone(),
        }
    }
}

fn format_timestamp(at: OffsetDateTime) -> Option<String> {
    at.format(&Rfc3339).ok()
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn storage(source: &'static str, err: &StorageError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "failed to list files",
            report: ErrorReport::from_error(source, StatusCode::INTERNAL_SERVER_ERROR, err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            code: self.status.as_u16(),
            message: self.message.to_string(),
            data: None,
            pagination: None,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Raw paging parameters; unparsable values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListingQuery {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
}

impl ListingQuery {
    fn resolve(&self) -> (usize, usize) {
        let page = self
            .page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1);
        let page_size = self
            .page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        (page, page_size)
    }
}

/// Immediate children of `prefix`: files directly under it and one synthetic
/// directory entry per deeper first segment, in listing order.
pub fn build_listing(prefix: &str, objects: &[ObjectInfo]) -> Vec<FileEntry> {
    let mut entries = Vec::new();
    let mut seen_dirs = HashSet::new();

    for object in objects {
        let Some(relative) = object.key.strip_prefix(prefix) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }

        match relative.split_once('/') {
            Some((dir, _)) => {
                let path = format!("{prefix}{dir}/");
                if seen_dirs.insert(path.clone()) {
                    entries.push(FileEntry {
                        name: dir.to_string(),
                        path,
                        size: 0,
                        last_modified: None,
                        is_directory: true,
                        url: None,
                    });
                }
            }
            None => entries.push(FileEntry {
                name: relative.to_string(),
                path: object.key.clone(),
                size: object.size,
                last_modified: object.modified_at.and_then(format_timestamp),
                is_directory: false,
                url: None,
            }),
        }
    }

    entries
}

/// Slice one page out of `entries`.
pub fn paginate(entries: Vec<FileEntry>, page: usize, page_size: usize) -> (Vec<FileEntry>, Pagination) {
    let total = entries.len();
    let start = (page - 1).saturating_mul(page_size);
    let items = entries.into_iter().skip(start).take(page_size).collect();
    (
        items,
        Pagination {
            current: page,
            page_size,
            total,
        },
    )
}

fn normalise_prefix(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

pub async fn list_root(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Response, ApiError> {
    list(state, String::new(), query).await
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
    Query(query): Query<ListingQuery>,
) -> Result<Response, ApiError> {
    list(state, normalise_prefix(&prefix), query).await
}

async fn list(state: AppState, prefix: String, query: ListingQuery) -> Result<Response, ApiError> {
    const SOURCE: &str = "infra::http::api::list_files";

    let (page, page_size) = query.resolve();
    let objects = state.store.list_objects(&prefix).await.map_err(|err| {
        error!(target = SOURCE, prefix = %prefix, error = %err, "listing failed");
        ApiError::storage(SOURCE, &err)
    })?;

    let (mut items, pagination) = paginate(build_listing(&prefix, &objects), page, page_size);

    if state.options.use_public_url {
        for item in items.iter_mut().filter(|item| !item.is_directory) {
            match state
                .store
                .presigned_get_url(&item.path, state.options.presign_ttl)
                .await
            {
                Ok(url) => {
                    if state.options.presign_log {
                        debug!(target = "docmirror::http::presign", key = %item.path, "presigned");
                    }
                    item.url = Some(url);
                }
                Err(err) => {
                    warn!(target = SOURCE, key = %item.path, error = %err, "presign failed");
                }
            }
        }
    }

    Ok(Json(ApiResponse::success(items, Some(pagination))).into_response())
}

pub async fn sync_status(State(state): State<AppState>) -> Response {
    let statuses: BTreeMap<String, SyncStatusView> = state
        .repositories
        .iter()
        .map(|repo| {
            let status = state.registry.status(&repo.remote_prefix);
            (repo.remote_prefix.clone(), SyncStatusView::from(&status))
        })
        .collect();

    Json(ApiResponse::success(statuses, None)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str, size: u64) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size,
            modified_at: None,
        }
    }

    #[test]
    fn listing_synthesises_directories_once() {
        let objects = vec![
            object("docs/index.md", 10),
            object("docs/guide/a.md", 1),
            object("docs/guide/b.md", 2),
            object("docs/api/c.md", 3),
        ];

        let listing = build_listing("docs/", &objects);
        let names: Vec<(&str, bool)> = listing
            .iter()
            .map(|entry| (entry.name.as_str(), entry.is_directory))
            .collect();

        assert_eq!(
            names,
            vec![("index.md", false), ("guide", true), ("api", true)]
        );
        assert_eq!(listing[1].path, "docs/guide/");
        assert_eq!(listing[0].size, 10);
    }

    #[test]
    fn query_defaults_are_lenient() {
        let query = ListingQuery {
            page: Some("0".to_string()),
            page_size: Some("500".to_string()),
        };
        assert_eq!(query.resolve(), (1, DEFAULT_PAGE_SIZE));

        let query = ListingQuery {
            page: Some("3".to_string()),
            page_size: Some("abc".to_string()),
        };
        assert_eq!(query.resolve(), (3, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let entries = build_listing("", &[object("a", 1), object("b", 1), object("c", 1)]);

        let (items, pagination) = paginate(entries.clone(), 2, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(pagination.total, 3);

        let (items, _) = paginate(entries, 5, 2);
        assert!(items.is_empty());
    }

    #[test]
    fn prefix_is_normalised_to_directory_form() {
        assert_eq!(normalise_prefix("docs"), "docs/");
        assert_eq!(normalise_prefix("docs/guide/"), "docs/guide/");
        assert_eq!(normalise_prefix(""), "");
    }

    #[test]
    fn status_view_uses_wire_names() {
        let view = SyncStatusView::from(&SyncStatus::unknown());
        let json = serde_json::to_value(&view).expect("serialize");

        assert_eq!(json["status"], "unknown");
        assert_eq!(json["totalFiles"], 0);
        assert!(json["lastSync"].is_null());
    }
}
