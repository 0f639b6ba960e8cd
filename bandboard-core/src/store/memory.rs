/// In-process realtime store.
///
/// Holds the whole key-path tree as one JSON value behind a mutex, so writes
/// from every connection apply in issuance order. Each connection keeps its
/// own disconnect hooks; `MemoryStore::disconnect` runs them the way a hosted
/// realtime database would when a socket drops.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::{DisconnectAction, KeyPath, RemoteStore, StoreError, StoreEvent};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    tree: Mutex<Value>,
    /// client_id -> registered hooks, in registration order
    hooks: Mutex<HashMap<String, Vec<(KeyPath, DisconnectAction)>>>,
    connected: Mutex<HashSet<String>>,
    events: broadcast::Sender<StoreEvent>,
    /// Monotonic change counter, incremented on every mutation
    version: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn apply_set(&self, path: &KeyPath, value: Value) {
        let mut tree = lock(&self.tree);
        set_at(&mut tree, path.segments(), normalize(value));
        self.publish(&mut tree, path);
    }

    fn apply_update(&self, path: &KeyPath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut targets = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            targets.push((path.join(&key)?, value));
        }
        let mut tree = lock(&self.tree);
        for (target, value) in targets {
            set_at(&mut tree, target.segments(), normalize(value));
        }
        self.publish(&mut tree, path);
        Ok(())
    }

    /// Bump the version and broadcast the value now at `path`. Called with the
    /// tree guard held so events go out in the order the writes applied.
    fn publish(&self, tree: &mut Value, path: &KeyPath) {
        if !tree.is_object() {
            *tree = Value::Object(Map::new());
        }
        let new_value = get_at(tree, path.segments()).cloned();
        self.version.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(StoreEvent {
            path: path.clone(),
            value: new_value,
        });
    }

    fn run_action(&self, path: &KeyPath, action: DisconnectAction) {
        match action {
            DisconnectAction::Write(value) => self.apply_set(path, value),
            DisconnectAction::Delete => self.apply_set(path, Value::Null),
            DisconnectAction::Update(fields) => {
                if let Err(e) = self.apply_update(path, fields) {
                    log::warn!("[bandboard.store] Disconnect update on {} failed: {}", path, e);
                }
            }
        }
    }
}

/// Shared in-memory realtime store. Cloning shares the same tree.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Start from an existing tree (e.g. loaded from disk).
    pub fn from_value(tree: Value) -> Self {
        let tree = match normalize(tree) {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tree: Mutex::new(tree),
                hooks: Mutex::new(HashMap::new()),
                connected: Mutex::new(HashSet::new()),
                events,
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Clone of the whole tree.
    pub fn export(&self) -> Value {
        lock(&self.inner.tree).clone()
    }

    /// Number of mutations applied so far.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Open a client connection. Reconnecting with a known id keeps its hooks.
    pub fn connect(&self, client_id: impl Into<String>) -> MemoryConnection {
        let client_id = client_id.into();
        lock(&self.inner.connected).insert(client_id.clone());
        MemoryConnection {
            inner: Arc::clone(&self.inner),
            client_id,
        }
    }

    /// Drop a client connection and run its disconnect hooks in registration order.
    /// Returns the number of hooks run.
    pub fn disconnect(&self, client_id: &str) -> usize {
        lock(&self.inner.connected).remove(client_id);
        let hooks = lock(&self.inner.hooks).remove(client_id).unwrap_or_default();
        let count = hooks.len();
        for (path, action) in hooks {
            log::debug!("[bandboard.store] Running disconnect hook for {} on {}", client_id, path);
            self.inner.run_action(&path, action);
        }
        count
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        lock(&self.inner.connected).contains(client_id)
    }
}

/// One client's view of a `MemoryStore`.
#[derive(Clone)]
pub struct MemoryConnection {
    inner: Arc<Inner>,
    client_id: String,
}

impl MemoryConnection {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The store this connection belongs to.
    pub fn store(&self) -> MemoryStore {
        MemoryStore {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Simulate the socket dropping. Returns the number of hooks run.
    pub fn disconnect(&self) -> usize {
        self.store().disconnect(&self.client_id)
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if lock(&self.inner.connected).contains(&self.client_id) {
            Ok(())
        } else {
            Err(StoreError::Disconnected(self.client_id.clone()))
        }
    }
}

impl RemoteStore for MemoryConnection {
    fn read(&self, path: &KeyPath) -> Result<Option<Value>, StoreError> {
        self.ensure_connected()?;
        let tree = lock(&self.inner.tree);
        Ok(get_at(&tree, path.segments()).cloned())
    }

    fn write(&self, path: &KeyPath, value: Value) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.inner.apply_set(path, value);
        Ok(())
    }

    fn update(&self, path: &KeyPath, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.inner.apply_update(path, fields)
    }

    fn delete(&self, path: &KeyPath) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.inner.apply_set(path, Value::Null);
        Ok(())
    }

    fn push(&self, path: &KeyPath, value: Value) -> Result<String, StoreError> {
        self.ensure_connected()?;
        let key = generate_push_key();
        self.inner.apply_set(&path.child(key.clone()), value);
        Ok(key)
    }

    fn on_disconnect(&self, path: &KeyPath, action: DisconnectAction) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut hooks = lock(&self.inner.hooks);
        let entries = hooks.entry(self.client_id.clone()).or_default();
        entries.retain(|(p, _)| p != path);
        entries.push((path.clone(), action));
        Ok(())
    }

    fn cancel_on_disconnect(&self, path: &KeyPath) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut hooks = lock(&self.inner.hooks);
        if let Some(entries) = hooks.get_mut(&self.client_id) {
            entries.retain(|(p, _)| p != path);
            if entries.is_empty() {
                hooks.remove(&self.client_id);
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }
}

/// Time-ordered unique child key (UUIDv7, 32 hex chars).
pub fn generate_push_key() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Drop nulls and empty containers; the store never holds them.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        Value::Array(items) if items.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn get_at<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = node;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    if is_empty(current) {
        None
    } else {
        Some(current)
    }
}

/// Set (or with `Value::Null`, remove) the value at `segments`, pruning
/// parents that become empty.
fn set_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
        return;
    }
    let child = map.entry(head.clone()).or_insert(Value::Null);
    set_at(child, rest, value);
    if is_empty(child) {
        map.remove(head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fields, path};
    use serde_json::json;

    fn connected() -> (MemoryStore, MemoryConnection) {
        let store = MemoryStore::new();
        let conn = store.connect("client-a");
        (store, conn)
    }

    #[test]
    fn test_write_read_delete() {
        let (_store, conn) = connected();
        let p = path::note("w1", "n1");
        conn.write(&p, json!({ "text": "hi", "column": 0, "position": 1000.0 }))
            .unwrap();
        assert_eq!(conn.read(&p).unwrap().unwrap()["text"], "hi");

        conn.delete(&p).unwrap();
        assert_eq!(conn.read(&p).unwrap(), None);
        // Empty parents are pruned all the way up.
        assert_eq!(conn.read(&path::boarddata()).unwrap(), None);
    }

    #[test]
    fn test_update_merges_and_deletes_with_null() {
        let (_store, conn) = connected();
        let p = path::note("w1", "n1");
        conn.write(&p, json!({ "text": "a", "column": 0, "position": 1.0, "color": 2 }))
            .unwrap();
        conn.update(&p, fields([("text", json!("b")), ("color", Value::Null)]))
            .unwrap();

        let note = conn.read(&p).unwrap().unwrap();
        assert_eq!(note, json!({ "text": "b", "column": 0, "position": 1.0 }));
    }

    #[test]
    fn test_update_with_nested_keys() {
        let (_store, conn) = connected();
        conn.write(&path::snapshot("a"), json!({ "timestamp": 1 })).unwrap();
        conn.write(&path::snapshot("b"), json!({ "timestamp": 2 })).unwrap();
        conn.update(&path::snapshots(), fields([("a", Value::Null)])).unwrap();
        conn.update(&KeyPath::root(), fields([("snapshots/c/timestamp", json!(3))]))
            .unwrap();

        let all = conn.read(&path::snapshots()).unwrap().unwrap();
        let keys: Vec<_> = all.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_null_fields_are_not_stored() {
        let (store, conn) = connected();
        conn.write(&path::worker("w1"), json!({ "name": "Bass", "defaultColor": null }))
            .unwrap();
        assert_eq!(store.export(), json!({ "boarddata": { "w1": { "name": "Bass" } } }));
    }

    #[test]
    fn test_push_generates_unique_keys() {
        let (_store, conn) = connected();
        let a = conn.push(&path::snapshots(), json!({ "timestamp": 1 })).unwrap();
        let b = conn.push(&path::snapshots(), json!({ "timestamp": 2 })).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(conn.read(&path::snapshot(&b)).unwrap().is_some());
    }

    #[test]
    fn test_disconnect_runs_hooks_once() {
        let (store, conn) = connected();
        let other = store.connect("client-b");
        let p = path::lock("n1");
        conn.write(&p, json!({ "userId": "u1", "userName": "A", "timestamp": 1 }))
            .unwrap();
        conn.on_disconnect(&p, DisconnectAction::Delete).unwrap();

        assert_eq!(conn.disconnect(), 1);
        assert_eq!(other.read(&p).unwrap(), None);
        assert_eq!(store.disconnect("client-a"), 0);
        assert!(matches!(conn.read(&p), Err(StoreError::Disconnected(_))));
    }

    #[test]
    fn test_cancel_on_disconnect() {
        let (store, conn) = connected();
        let p = path::lock("n1");
        conn.write(&p, json!({ "userId": "u1", "userName": "A", "timestamp": 1 }))
            .unwrap();
        conn.on_disconnect(&p, DisconnectAction::Delete).unwrap();
        conn.cancel_on_disconnect(&p).unwrap();

        assert_eq!(conn.disconnect(), 0);
        let observer = store.connect("observer");
        assert!(observer.read(&p).unwrap().is_some());
    }

    #[test]
    fn test_disconnect_update_hook() {
        let (store, conn) = connected();
        let p = path::presence_user("u1");
        conn.write(&p, json!({ "userId": "u1", "userName": "A", "online": true, "lastActive": 1 }))
            .unwrap();
        conn.on_disconnect(&p, DisconnectAction::Update(fields([("online", json!(false))])))
            .unwrap();
        conn.disconnect();

        let observer = store.connect("observer");
        assert_eq!(observer.read(&p).unwrap().unwrap()["online"], false);
    }

    #[test]
    fn test_events_carry_new_value() {
        let (_store, conn) = connected();
        let mut rx = conn.subscribe();
        let p = path::category("c1");
        conn.write(&p, json!({ "name": "Gig", "items": ["Load van"] })).unwrap();
        conn.delete(&p).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.path, p);
        assert_eq!(first.value.unwrap()["name"], "Gig");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.value, None);
    }

    #[test]
    fn test_concurrent_writes_publish_in_write_order() {
        let store = MemoryStore::new();
        let p = path::note("w1", "n1");
        let mut rx = store.subscribe();

        let writers: Vec<_> = (0..8)
            .map(|t| {
                let conn = store.connect(format!("writer-{}", t));
                let p = p.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        let body = json!({ "text": format!("{}-{}", t, i), "column": 0, "position": 1.0 });
                        conn.write(&p, body).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut last = None;
        let mut seen = 0;
        while let Ok(event) = rx.try_recv() {
            last = event.value;
            seen += 1;
        }
        assert_eq!(seen, 160);
        let observer = store.connect("observer");
        assert_eq!(last, observer.read(&p).unwrap());
    }

    #[test]
    fn test_version_counts_mutations() {
        let (store, conn) = connected();
        assert_eq!(store.version(), 0);
        conn.write(&path::custom_palette(), json!(["#000000"])).unwrap();
        conn.delete(&path::custom_palette()).unwrap();
        assert_eq!(store.version(), 2);
    }
}
