/// WebSocket key-path sync handler.
///
/// Protocol:
///   Client sends Hello { clientId?, userId } on connect.
///   Server replies Welcome { clientId } and opens a store connection for it.
///   Subscribe answers with the current Value, then Changed is streamed for
///   every mutation overlapping a subscribed path.
///   When the socket closes the connection's disconnect hooks run.
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bandboard_core::store::memory::MemoryConnection;
use bandboard_core::store::{KeyPath, RemoteStore, StoreEvent};
use bandboard_core::sync::{is_relevant, ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

use crate::state::{AppState, SERVER_CLIENT_ID};

const HELLO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

type Subscriptions = Arc<Mutex<Vec<KeyPath>>>;

pub fn sync_router() -> Router<AppState> {
    Router::new().route("/sync", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_sync_session(socket, state))
}

fn encode(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

async fn handle_sync_session(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // 1. Wait for Hello (10s timeout)
    let hello = tokio::time::timeout(HELLO_TIMEOUT, async {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                return serde_json::from_str::<ClientMessage>(&text).ok();
            }
        }
        None
    })
    .await;

    let (requested_id, user_id) = match hello {
        Ok(Some(ClientMessage::Hello { client_id, user_id })) => (client_id, user_id),
        _ => {
            let err = encode(&ServerMessage::Error {
                message: "Expected Hello within 10s".to_string(),
            });
            let _ = ws_tx.send(Message::Text(err.into())).await;
            return;
        }
    };

    // 2. Claim the client id
    let client_id = requested_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let claimed = client_id != SERVER_CLIENT_ID && {
        let mut clients = state.sync_clients.lock().await;
        clients.insert(client_id.clone())
    };
    if !claimed {
        let err = encode(&ServerMessage::Error {
            message: format!("Client id {} is already connected", client_id),
        });
        let _ = ws_tx.send(Message::Text(err.into())).await;
        return;
    }

    let conn = state.store.connect(client_id.clone());
    log::info!(
        target: "bandboard.sync",
        "Client {} connected (user={})",
        client_id,
        user_id
    );

    // 3. Send Welcome
    let welcome = encode(&ServerMessage::Welcome {
        client_id: client_id.clone(),
    });
    if ws_tx.send(Message::Text(welcome.into())).await.is_err() {
        close_session(&state, &conn).await;
        return;
    }

    // 4. Split into read, write and event-forwarding tasks
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let subscriptions: Subscriptions = Arc::new(Mutex::new(Vec::new()));

    // Write task: forward outgoing messages to the WebSocket
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(Message::Text(encode(&msg).into())).await.is_err() {
                break;
            }
        }
    });

    // Event task: forward store changes under subscribed paths
    let mut events = conn.subscribe();
    let event_subs = Arc::clone(&subscriptions);
    let event_tx = out_tx.clone();
    let event_client = client_id.clone();
    let mut event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(msg) = forward(&event_subs, &event) {
                        if event_tx.send(msg).is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        target: "bandboard.sync",
                        "Client {} lagged, {} events skipped",
                        event_client,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Read task: apply client operations
    let read_conn = conn.clone();
    let read_subs = Arc::clone(&subscriptions);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => break,
                _ => continue,
            };

            let parsed: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    let _ = out_tx.send(ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    });
                    continue;
                }
            };

            for reply in dispatch(&read_conn, &read_subs, parsed) {
                if out_tx.send(reply).is_err() {
                    return;
                }
            }
        }
    });

    // Wait for any task to finish, abort the others to prevent leaks
    tokio::select! {
        _ = &mut write_task => { read_task.abort(); event_task.abort(); }
        _ = &mut read_task => { write_task.abort(); event_task.abort(); }
        _ = &mut event_task => { read_task.abort(); write_task.abort(); }
    }

    // 5. Cleanup
    close_session(&state, &conn).await;
}

async fn close_session(state: &AppState, conn: &MemoryConnection) {
    let hooks = conn.disconnect();
    state.sync_clients.lock().await.remove(conn.client_id());
    log::info!(
        target: "bandboard.sync",
        "Client {} disconnected ({} disconnect hooks run)",
        conn.client_id(),
        hooks
    );
}

fn lock_subs(subs: &Subscriptions) -> std::sync::MutexGuard<'_, Vec<KeyPath>> {
    subs.lock().unwrap_or_else(|e| e.into_inner())
}

/// Changed message for `event` if any subscription overlaps its path.
fn forward(subs: &Subscriptions, event: &StoreEvent) -> Option<ServerMessage> {
    let relevant = lock_subs(subs).iter().any(|s| is_relevant(s, &event.path));
    relevant.then(|| ServerMessage::Changed {
        path: event.path.clone(),
        value: event.value.clone(),
    })
}

/// Apply one client message to its store connection. Returns the replies to send.
fn dispatch(conn: &dyn RemoteStore, subs: &Subscriptions, msg: ClientMessage) -> Vec<ServerMessage> {
    let result = match msg {
        ClientMessage::Hello { .. } => {
            return vec![ServerMessage::Error {
                message: "Already greeted".to_string(),
            }]
        }
        ClientMessage::Subscribe { path } => {
            {
                let mut subs = lock_subs(subs);
                if !subs.contains(&path) {
                    subs.push(path.clone());
                }
            }
            return match conn.read(&path) {
                Ok(value) => vec![ServerMessage::Value { path, value }],
                Err(e) => vec![ServerMessage::Error {
                    message: e.to_string(),
                }],
            };
        }
        ClientMessage::Unsubscribe { path } => {
            lock_subs(subs).retain(|p| p != &path);
            Ok(())
        }
        ClientMessage::Write { path, value } => conn.write(&path, value),
        ClientMessage::Update { path, fields } => conn.update(&path, fields),
        ClientMessage::Delete { path } => conn.delete(&path),
        ClientMessage::Push {
            request_id,
            path,
            value,
        } => {
            return match conn.push(&path, value) {
                Ok(key) => vec![ServerMessage::Pushed { request_id, key }],
                Err(e) => vec![ServerMessage::Error {
                    message: e.to_string(),
                }],
            };
        }
        ClientMessage::OnDisconnect { path, action } => conn.on_disconnect(&path, action),
        ClientMessage::CancelOnDisconnect { path } => conn.cancel_on_disconnect(&path),
    };
    match result {
        Ok(()) => Vec::new(),
        Err(e) => {
            log::warn!(target: "bandboard.sync", "Client operation failed: {}", e);
            vec![ServerMessage::Error {
                message: e.to_string(),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandboard_core::store::memory::MemoryStore;
    use bandboard_core::store::DisconnectAction;
    use serde_json::json;

    fn path(raw: &str) -> KeyPath {
        KeyPath::parse(raw).unwrap()
    }

    #[test]
    fn test_subscribe_returns_current_value() {
        let store = MemoryStore::from_value(json!({"locks": {"n1": {"userId": "u1"}}}));
        let conn = store.connect("c1");
        let subs: Subscriptions = Arc::default();

        let replies = dispatch(&conn, &subs, ClientMessage::Subscribe { path: path("locks") });
        assert_eq!(
            replies,
            vec![ServerMessage::Value {
                path: path("locks"),
                value: Some(json!({"n1": {"userId": "u1"}})),
            }]
        );
        assert_eq!(lock_subs(&subs).len(), 1);
    }

    #[test]
    fn test_forward_only_subscribed_changes() {
        let store = MemoryStore::new();
        let conn = store.connect("c1");
        let mut events = conn.subscribe();
        let subs: Subscriptions = Arc::default();
        dispatch(&conn, &subs, ClientMessage::Subscribe { path: path("boarddata") });

        conn.write(&path("boarddata/w1"), json!({"name": "Bass"})).unwrap();
        conn.write(&path("presence/u1"), json!({"online": true})).unwrap();

        let first = events.try_recv().unwrap();
        assert!(matches!(forward(&subs, &first), Some(ServerMessage::Changed { .. })));
        let second = events.try_recv().unwrap();
        assert_eq!(forward(&subs, &second), None);

        dispatch(&conn, &subs, ClientMessage::Unsubscribe { path: path("boarddata") });
        assert_eq!(forward(&subs, &first), None);
    }

    #[test]
    fn test_push_and_disconnect_hooks() {
        let store = MemoryStore::new();
        let conn = store.connect("c1");
        let subs: Subscriptions = Arc::default();

        let replies = dispatch(
            &conn,
            &subs,
            ClientMessage::Push {
                request_id: "r1".into(),
                path: path("snapshots"),
                value: json!({"title": "t"}),
            },
        );
        assert!(matches!(&replies[..], [ServerMessage::Pushed { request_id, .. }] if request_id == "r1"));

        dispatch(&conn, &subs, ClientMessage::Write {
            path: path("locks/n1"),
            value: json!({"userId": "u1", "userName": "Ann", "timestamp": 1}),
        });
        let replies = dispatch(&conn, &subs, ClientMessage::OnDisconnect {
            path: path("locks/n1"),
            action: DisconnectAction::Delete,
        });
        assert!(replies.is_empty());

        assert_eq!(conn.disconnect(), 1);
        assert!(store.export().get("locks").is_none());
    }

    #[test]
    fn test_errors_are_reported() {
        let store = MemoryStore::new();
        let conn = store.connect("c1");
        let subs: Subscriptions = Arc::default();
        conn.disconnect();

        let replies = dispatch(&conn, &subs, ClientMessage::Delete { path: path("locks/n1") });
        assert!(matches!(&replies[..], [ServerMessage::Error { .. }]));

        let replies = dispatch(&conn, &subs, ClientMessage::Hello {
            client_id: None,
            user_id: "u1".into(),
        });
        assert!(matches!(&replies[..], [ServerMessage::Error { message }] if message == "Already greeted"));
    }
}
