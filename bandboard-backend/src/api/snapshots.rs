use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use bandboard_core::snapshot::SnapshotReason;
use bandboard_core::types::{Snapshot, UserIdentity};
use serde::{Deserialize, Serialize};

use super::{api_error, snapshot_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotBody {
    #[serde(default)]
    title: Option<String>,
    user_id: String,
    user_name: String,
}

/// A snapshot without its trees.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    id: String,
    title: String,
    timestamp: u64,
    created_by: String,
    creator_id: String,
}

impl SnapshotSummary {
    fn new(id: String, snapshot: &Snapshot) -> Self {
        Self {
            id,
            title: snapshot.title.clone(),
            timestamp: snapshot.timestamp,
            created_by: snapshot.created_by.clone(),
            creator_id: snapshot.creator_id.clone(),
        }
    }
}

pub async fn list_snapshots(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshots = state
        .snapshots
        .list()
        .map_err(|e| snapshot_error("bandboard.api.snapshots", e))?;
    let summaries: Vec<SnapshotSummary> = snapshots
        .into_iter()
        .map(|(id, snapshot)| SnapshotSummary::new(id, &snapshot))
        .collect();
    Ok(Json(serde_json::json!({ "snapshots": summaries })))
}

pub async fn create_snapshot(
    State(state): State<AppState>,
    Json(body): Json<CreateSnapshotBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let target = "bandboard.api.create_snapshot";
    if body.user_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, target, "userId must not be empty"));
    }
    let user = UserIdentity::new(body.user_id, body.user_name);
    let reason = SnapshotReason::Manual(body.title.unwrap_or_default());
    let id = state
        .snapshots
        .capture(&reason, &user)
        .map_err(|e| snapshot_error(target, e))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    state
        .snapshots
        .get(&snapshot_id)
        .map(Json)
        .map_err(|e| snapshot_error("bandboard.api.get_snapshot", e))
}

pub async fn restore_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> Result<Json<SnapshotSummary>, ApiError> {
    let snapshot = state
        .snapshots
        .restore(&snapshot_id)
        .map_err(|e| snapshot_error("bandboard.api.restore_snapshot", e))?;
    Ok(Json(SnapshotSummary::new(snapshot_id, &snapshot)))
}

pub async fn delete_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .snapshots
        .delete(&snapshot_id)
        .map_err(|e| snapshot_error("bandboard.api.delete_snapshot", e))?;
    Ok(StatusCode::NO_CONTENT)
}
