/// Store wrappers for exercising failure paths.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::memory::{MemoryConnection, MemoryStore};
use super::{DisconnectAction, KeyPath, RemoteStore, StoreError, StoreEvent};

/// Passes everything through to a `MemoryConnection` until `fail_writes` is set,
/// after which every mutating call fails. Reads keep working.
pub struct FlakyStore {
    inner: MemoryConnection,
    fail_writes: AtomicBool,
    failed_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            inner: store.connect("flaky"),
            fail_writes: AtomicBool::new(false),
            failed_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteStore for FlakyStore {
    fn read(&self, path: &KeyPath) -> Result<Option<Value>, StoreError> {
        self.inner.read(path)
    }

    fn write(&self, path: &KeyPath, value: Value) -> Result<(), StoreError> {
        self.check()?;
        self.inner.write(path, value)
    }

    fn update(&self, path: &KeyPath, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update(path, fields)
    }

    fn delete(&self, path: &KeyPath) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(path)
    }

    fn push(&self, path: &KeyPath, value: Value) -> Result<String, StoreError> {
        self.check()?;
        self.inner.push(path, value)
    }

    fn on_disconnect(&self, path: &KeyPath, action: DisconnectAction) -> Result<(), StoreError> {
        self.check()?;
        self.inner.on_disconnect(path, action)
    }

    fn cancel_on_disconnect(&self, path: &KeyPath) -> Result<(), StoreError> {
        self.check()?;
        self.inner.cancel_on_disconnect(path)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}
