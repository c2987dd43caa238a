//! Memory store endpoints.  These act on the store directly and do not
//! touch any session.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use mv_store::{MemoryArchive, OrganizeRule, ViewRange, ROOT_PREFIX};

use crate::api::{api_error, store_error};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request bodies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ViewBody {
    pub path: String,
    #[serde(default)]
    pub view_range: Option<ViewRange>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    #[serde(default)]
    pub file_pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizeBody {
    pub rules: Vec<OrganizeRule>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreBody {
    pub archive: MemoryArchive,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Primitives
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `POST /v1/memory/view`: structured output plus the rendered text the
/// model would see.
pub async fn view(State(state): State<AppState>, Json(body): Json<ViewBody>) -> Response {
    match state.store.view(&body.path, body.view_range).await {
        Ok(out) => Json(serde_json::json!({
            "rendered": out.render(),
            "view": out,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn create(State(state): State<AppState>, Json(body): Json<CreateBody>) -> Response {
    match state.store.create(&body.path, &body.content).await {
        Ok(path) => Json(serde_json::json!({
            "path": path,
            "message": format!("File created successfully at {path}"),
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

/// `DELETE /v1/memory/*path`.  Accepts both `notes/a.txt` and
/// `memories/notes/a.txt`.
pub async fn delete_path(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let path = wildcard_to_virtual(&raw);
    match state.store.delete(&path).await {
        Ok(path) => Json(serde_json::json!({ "path": path, "deleted": true })).into_response(),
        Err(e) => store_error(e),
    }
}

fn wildcard_to_virtual(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('/');
    let prefix = ROOT_PREFIX.trim_start_matches('/');
    if trimmed == prefix || trimmed.starts_with(&format!("{prefix}/")) {
        format!("/{trimmed}")
    } else {
        format!("{ROOT_PREFIX}/{trimmed}")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn files(State(state): State<AppState>) -> Response {
    match state.index.list().await {
        Ok(files) => Json(serde_json::json!({
            "count": files.len(),
            "files": files,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn summary(State(state): State<AppState>) -> Response {
    match state.index.summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn search(State(state): State<AppState>, Json(body): Json<SearchBody>) -> Response {
    match state
        .index
        .search(&body.query, body.file_pattern.as_deref())
        .await
    {
        Ok(report) => Json(serde_json::json!({
            "query": body.query,
            "total_matches": report.total_matches,
            "results": report.hits,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn organize(State(state): State<AppState>, Json(body): Json<OrganizeBody>) -> Response {
    if body.rules.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "rules must not be empty");
    }
    match state.index.organize(&body.rules, body.dry_run).await {
        Ok(report) => Json(serde_json::json!({
            "moved_count": report.moved.len(),
            "report": report,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn backup(State(state): State<AppState>) -> Response {
    match state.index.backup().await {
        Ok(archive) => Json(archive).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn restore(State(state): State<AppState>, Json(body): Json<RestoreBody>) -> Response {
    match state.index.restore(&body.archive).await {
        Ok(count) => Json(serde_json::json!({ "restored": count })).into_response(),
        Err(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::wildcard_to_virtual;

    #[test]
    fn wildcard_paths_land_under_memories() {
        assert_eq!(wildcard_to_virtual("notes/a.txt"), "/memories/notes/a.txt");
        assert_eq!(wildcard_to_virtual("memories/notes/a.txt"), "/memories/notes/a.txt");
        assert_eq!(wildcard_to_virtual("memories"), "/memories");
        assert_eq!(wildcard_to_virtual("memoriesx/a"), "/memories/memoriesx/a");
    }
}
