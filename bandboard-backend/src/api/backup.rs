use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use bandboard_core::backup::{self, BackupFile};

use super::{backup_error, insert_header_safe, ApiError};
use crate::state::AppState;

pub async fn export_backup(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<BackupFile>), ApiError> {
    let file = backup::export(&state.server, state.clock.as_ref())
        .map_err(|e| backup_error("bandboard.api.export_backup", e))?;
    let mut headers = HeaderMap::new();
    insert_header_safe(
        &mut headers,
        "content-disposition",
        &format!("attachment; filename=\"{}\"", file.file_name()),
    );
    Ok((headers, Json(file)))
}

/// Takes the raw body so malformed JSON surfaces as a backup error, not an extractor rejection.
pub async fn import_backup(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let file = backup::import(&state.server, &body)
        .map_err(|e| backup_error("bandboard.api.import_backup", e))?;
    log::info!(target: "bandboard.api.import_backup", "Imported backup dated {}", file.timestamp);
    Ok(Json(serde_json::json!({
        "imported": {
            "boardData": file.board_data.is_some(),
            "categories": file.categories.is_some(),
            "customColors": file.custom_colors.is_some(),
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app_with, body_json, send};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_export_then_import_round_trip() {
        let tree = json!({
            "boarddata": {"w1": {"name": "Guitar", "notes": {"n1": {"text": "A", "column": 1, "position": 1000.0}}}},
            "categories": {"c1": {"name": "Gig", "items": ["Load"]}}
        });
        let (source, _) = app_with(tree.clone());
        let res = send(&source, Method::GET, "/backup", None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("bandboard-backup-1970-01-01.json"));
        let exported = body_json(res).await;
        assert_eq!(exported["version"], json!(1));

        let (target, state) = app_with(json!({}));
        let res = send(&target, Method::POST, "/backup", Some(exported)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["imported"]["customColors"], json!(false));
        assert_eq!(state.store.export(), tree);
    }

    #[tokio::test]
    async fn test_import_rejects_empty_backup() {
        let (app, state) = app_with(json!({"boarddata": {"w1": {"name": "Guitar"}}}));
        let res = send(&app, Method::POST, "/backup", Some(json!({"version": 1}))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.export(), json!({"boarddata": {"w1": {"name": "Guitar"}}}));
    }

    #[tokio::test]
    async fn test_import_rejects_non_object_board() {
        let (app, state) = app_with(json!({"boarddata": {"w1": {"name": "Guitar"}}}));
        let body = json!({"version": 1, "boardData": 5, "customColors": ["red"]});
        let res = send(&app, Method::POST, "/backup", Some(body)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.export(), json!({"boarddata": {"w1": {"name": "Guitar"}}}));
    }
}
