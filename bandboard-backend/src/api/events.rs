use axum::{
    extract::State,
    response::{sse::Event, Json, Sse},
};
use bandboard_core::sync::StatusInfo;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::AppState;

/// SSE endpoint: streams every StoreEvent as JSON to connected clients.
pub async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.store.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let json = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    // Keep-alive every 30 seconds
    let stream = stream.merge(tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(
            std::time::Duration::from_secs(30),
        )),
        |_| Ok(Event::default().comment("keep-alive")),
    ));

    Sse::new(stream)
}

pub async fn status(State(state): State<AppState>) -> Json<StatusInfo> {
    let connected_clients = state.sync_clients.lock().await.len();
    Json(StatusInfo {
        status: "running".to_string(),
        version: state.store.version(),
        connected_clients,
        data_file: state
            .config
            .data_file
            .as_ref()
            .map(|p| p.display().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app_with, body_json, send};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_status_reports_version() {
        let (app, _) = app_with(json!({}));
        send(&app, Method::PUT, "/data/customPalette", Some(json!(["#000000"]))).await;

        let res = send(&app, Method::GET, "/status", None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["status"], json!("running"));
        assert_eq!(body["version"], json!(1));
        assert_eq!(body["connectedClients"], json!(0));
    }
}
