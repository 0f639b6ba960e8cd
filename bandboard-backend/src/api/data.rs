use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use bandboard_core::store::{KeyPath, RemoteStore};
use serde_json::{Map, Value};

use super::{api_error, store_error, ApiError};
use crate::state::AppState;

fn parse_path(raw: &str, target: &'static str) -> Result<KeyPath, ApiError> {
    KeyPath::parse(raw).map_err(|e| store_error(target, e))
}

pub async fn read_root(State(state): State<AppState>) -> Json<Value> {
    Json(state.store.export())
}

pub async fn read_path(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target = "bandboard.api.read";
    let path = parse_path(&raw, target)?;
    match state.server.read(&path).map_err(|e| store_error(target, e))? {
        Some(value) => Ok(Json(value)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            target,
            format!("No data at {}", path),
        )),
    }
}

pub async fn write_path(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let target = "bandboard.api.write";
    let path = parse_path(&raw, target)?;
    state
        .server
        .write(&path, value)
        .map_err(|e| store_error(target, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_path(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<StatusCode, ApiError> {
    let target = "bandboard.api.update";
    let path = parse_path(&raw, target)?;
    state
        .server
        .update(&path, fields)
        .map_err(|e| store_error(target, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn push_path(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let target = "bandboard.api.push";
    let path = parse_path(&raw, target)?;
    let key = state
        .server
        .push(&path, value)
        .map_err(|e| store_error(target, e))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "key": key }))))
}

pub async fn delete_path(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = "bandboard.api.delete";
    let path = parse_path(&raw, target)?;
    state
        .server
        .delete(&path)
        .map_err(|e| store_error(target, e))?;
    Ok(StatusCode::NO_CONTENT)
}
