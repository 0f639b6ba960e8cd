/// Sync protocol message types shared between the backend and store clients.
///
/// Protocol:
///   Client sends Hello { client_id, user_id } on connect.
///   Server replies Welcome { client_id }.
///   Client subscribes to paths; the server answers each Subscribe with the
///   current Value and then streams Changed for every mutation under it.
///   Mutations (Write / Update / Delete / Push) and disconnect hooks mirror
///   the `RemoteStore` operations one to one.
///
/// Paths travel as `/`-separated strings and are validated with `KeyPath::parse`.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{DisconnectAction, KeyPath};

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Hello {
        client_id: Option<String>,
        user_id: String,
    },
    Subscribe {
        path: KeyPath,
    },
    Unsubscribe {
        path: KeyPath,
    },
    Write {
        path: KeyPath,
        value: Value,
    },
    Update {
        path: KeyPath,
        fields: Map<String, Value>,
    },
    Delete {
        path: KeyPath,
    },
    Push {
        request_id: String,
        path: KeyPath,
        value: Value,
    },
    OnDisconnect {
        path: KeyPath,
        action: DisconnectAction,
    },
    CancelOnDisconnect {
        path: KeyPath,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        client_id: String,
    },
    /// Current value at a freshly subscribed path.
    Value {
        path: KeyPath,
        value: Option<Value>,
    },
    Changed {
        path: KeyPath,
        value: Option<Value>,
    },
    Pushed {
        request_id: String,
        key: String,
    },
    Error {
        message: String,
    },
}

/// Whether a change at `changed` should reach a subscriber of `subscribed`:
/// either one contains the other.
pub fn is_relevant(subscribed: &KeyPath, changed: &KeyPath) -> bool {
    subscribed.overlaps(changed)
}

/// Server status as reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub status: String,
    pub version: u64,
    pub connected_clients: usize,
    pub data_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "Push",
            "requestId": "r1",
            "path": "/snapshots",
            "value": {"title": "t"}
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Push {
                request_id: "r1".into(),
                path: KeyPath::parse("snapshots").unwrap(),
                value: json!({"title": "t"}),
            }
        );

        let hook = ClientMessage::OnDisconnect {
            path: KeyPath::parse("locks/n1").unwrap(),
            action: DisconnectAction::Delete,
        };
        assert_eq!(
            serde_json::to_value(&hook).unwrap(),
            json!({"type": "OnDisconnect", "path": "/locks/n1", "action": {"kind": "delete"}})
        );
    }

    #[test]
    fn test_invalid_path_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({"type": "Delete", "path": "/locks/a.b"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_relevance() {
        let board = KeyPath::parse("boarddata").unwrap();
        let note = KeyPath::parse("boarddata/w1/notes/n1").unwrap();
        let locks = KeyPath::parse("locks").unwrap();
        assert!(is_relevant(&board, &note));
        assert!(is_relevant(&note, &board));
        assert!(is_relevant(&KeyPath::root(), &note));
        assert!(!is_relevant(&locks, &note));
    }

    #[test]
    fn test_server_message_wire_format() {
        let msg = ServerMessage::Changed {
            path: KeyPath::parse("presence/u1").unwrap(),
            value: None,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "Changed", "path": "/presence/u1", "value": null})
        );
    }
}
