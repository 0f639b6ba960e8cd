use axum::{
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use bandboard_core::backup::BackupError;
use bandboard_core::snapshot::SnapshotError;
use bandboard_core::store::StoreError;
use serde::Serialize;

mod backup;
mod data;
mod events;
mod snapshots;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /data                      -> whole store tree
///   GET    /data/{*path}              -> value at a key path (404 when absent)
///   PUT    /data/{*path}              -> overwrite (null or {} deletes)
///   PATCH  /data/{*path}              -> merge fields, `/` keys address sub-paths
///   POST   /data/{*path}              -> push under a generated key
///   DELETE /data/{*path}              -> delete
///   GET    /backup                    -> export backup file
///   POST   /backup                    -> import backup file
///   GET    /snapshots                 -> snapshot summaries, newest first
///   POST   /snapshots                 -> save a manual snapshot
///   GET    /snapshots/{id}            -> full snapshot
///   DELETE /snapshots/{id}            -> delete snapshot
///   POST   /snapshots/{id}/restore    -> restore boarddata + categories
///   GET    /events                    -> SSE stream of store changes
///   GET    /status                    -> health check
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/data", get(data::read_root))
        .route(
            "/data/{*path}",
            get(data::read_path)
                .put(data::write_path)
                .patch(data::update_path)
                .post(data::push_path)
                .delete(data::delete_path),
        )
        .route("/backup", get(backup::export_backup).post(backup::import_backup))
        .route(
            "/snapshots",
            get(snapshots::list_snapshots).post(snapshots::create_snapshot),
        )
        .route(
            "/snapshots/{snapshot_id}",
            get(snapshots::get_snapshot).delete(snapshots::delete_snapshot),
        )
        .route(
            "/snapshots/{snapshot_id}/restore",
            post(snapshots::restore_snapshot),
        )
        .route("/events", get(events::sse_events))
        .route("/status", get(events::status))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, target: &'static str, message: impl Into<String>) -> ApiError {
    let error = message.into();
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}

fn store_error(target: &'static str, e: StoreError) -> ApiError {
    let status = match e {
        StoreError::InvalidPath(_) | StoreError::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, target, e.to_string())
}

fn snapshot_error(target: &'static str, e: SnapshotError) -> ApiError {
    match e {
        SnapshotError::NotFound(_) => api_error(StatusCode::NOT_FOUND, target, e.to_string()),
        SnapshotError::Store(inner) => store_error(target, inner),
    }
}

fn backup_error(target: &'static str, e: BackupError) -> ApiError {
    match e {
        BackupError::Malformed(_) | BackupError::Empty | BackupError::Invalid { .. } => {
            api_error(StatusCode::BAD_REQUEST, target, e.to_string())
        }
        BackupError::Store(inner) => store_error(target, inner),
    }
}

fn insert_header_safe(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match value.parse() {
        Ok(parsed) => {
            headers.insert(name, parsed);
        }
        Err(e) => {
            log::warn!("Failed to set header {}={} ({})", name, value, e);
        }
    }
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Method, Request, Response};
    use axum::Router;
    use bandboard_core::clock::ManualClock;
    use bandboard_core::store::memory::MemoryStore;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::server::build_router;
    use crate::state::AppState;

    pub fn app_with(tree: Value) -> (Router, AppState) {
        let state = AppState::new(
            MemoryStore::from_value(tree),
            Arc::new(ManualClock::new(1_000)),
            ServerConfig::default(),
        );
        (build_router(state.clone()), state)
    }

    pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
