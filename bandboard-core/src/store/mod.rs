pub mod memory;
pub mod path;
pub mod persist;
#[cfg(test)]
pub(crate) mod testing;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub use path::KeyPath;

/// What the store does on our behalf once this client's connection drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum DisconnectAction {
    Write(Value),
    Update(Map<String, Value>),
    Delete,
}

/// Emitted after every mutation with the new value at the mutated path
/// (`None` once the path is gone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub path: KeyPath,
    pub value: Option<Value>,
}

/// Key-path store with realtime subscriptions.
/// Implementations: MemoryConnection (in-process), the backend's websocket peers.
///
/// Writes are last-write-wins per path. A `null` value or an empty object
/// removes the path. There are no cross-path transactions.
pub trait RemoteStore: Send + Sync {
    /// Read the current value once.
    fn read(&self, path: &KeyPath) -> Result<Option<Value>, StoreError>;

    /// Overwrite the value at `path`.
    fn write(&self, path: &KeyPath, value: Value) -> Result<(), StoreError>;

    /// Merge `fields` below `path`. Keys may be `/`-separated sub-paths and
    /// a `null` field deletes its sub-path.
    fn update(&self, path: &KeyPath, fields: Map<String, Value>) -> Result<(), StoreError>;

    fn delete(&self, path: &KeyPath) -> Result<(), StoreError>;

    /// Append under `path` with a generated, time-ordered child key.
    fn push(&self, path: &KeyPath, value: Value) -> Result<String, StoreError>;

    /// Register an action the store performs when this client disconnects.
    /// Registering again for the same path replaces the previous action.
    fn on_disconnect(&self, path: &KeyPath, action: DisconnectAction) -> Result<(), StoreError>;

    fn cancel_on_disconnect(&self, path: &KeyPath) -> Result<(), StoreError>;

    /// Subscribe to every change. Consumers filter by path.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid key path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Connection {0} is disconnected")]
    Disconnected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read and deserialize the value at `path`.
pub fn read_typed<T: DeserializeOwned>(
    store: &dyn RemoteStore,
    path: &KeyPath,
) -> Result<Option<T>, StoreError> {
    match store.read(path)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and overwrite the value at `path`.
pub fn write_typed<T: Serialize>(
    store: &dyn RemoteStore,
    path: &KeyPath,
    value: &T,
) -> Result<(), StoreError> {
    store.write(path, serde_json::to_value(value)?)
}

/// Build an update field map from `(key, value)` pairs.
pub fn fields<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
