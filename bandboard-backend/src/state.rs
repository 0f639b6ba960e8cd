/// Shared application state passed to axum handlers.
use std::collections::HashSet;
use std::sync::Arc;

use bandboard_core::clock::Clock;
use bandboard_core::snapshot::SnapshotService;
use bandboard_core::store::memory::{MemoryConnection, MemoryStore};
use bandboard_core::store::RemoteStore;
use tokio::sync::Mutex;

use crate::config::ServerConfig;

/// Client id the REST handlers use for their own store connection.
pub const SERVER_CLIENT_ID: &str = "bandboard-server";

#[derive(Clone)]
pub struct AppState {
    pub store: MemoryStore,
    /// Connection used by REST handlers; never disconnected.
    pub server: MemoryConnection,
    pub snapshots: Arc<SnapshotService>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
    /// Client ids with an open websocket.
    pub sync_clients: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(store: MemoryStore, clock: Arc<dyn Clock>, config: ServerConfig) -> Self {
        let server = store.connect(SERVER_CLIENT_ID);
        let remote: Arc<dyn RemoteStore> = Arc::new(server.clone());
        let snapshots = Arc::new(SnapshotService::new(
            remote,
            Arc::clone(&clock),
            config.board.snapshot_limit,
        ));
        Self {
            store,
            server,
            snapshots,
            clock,
            config: Arc::new(config),
            sync_clients: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}
