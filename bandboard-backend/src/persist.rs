/// Periodic flush of the store tree to its data file.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bandboard_core::store::memory::MemoryStore;
use bandboard_core::store::persist::StoreFile;
use bandboard_core::store::StoreError;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Persister {
    store: MemoryStore,
    file: Arc<Mutex<StoreFile>>,
}

impl Persister {
    pub fn new(store: MemoryStore, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            file: Arc::new(Mutex::new(StoreFile::new(path))),
        }
    }

    /// Write the tree if it changed since the last flush.
    pub fn flush(&self) -> Result<bool, StoreError> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.flush(&self.store)
    }

    /// Flush every `every` until the task is aborted. The first flush happens immediately.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.flush() {
                    log::warn!(target: "bandboard.persist", "Flush failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandboard_core::store::persist::load_store;
    use bandboard_core::store::{KeyPath, RemoteStore};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_writes_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        let store = MemoryStore::new();
        let conn = store.connect("c1");
        let task = Persister::new(store.clone(), &path).spawn(Duration::from_secs(5));

        conn.write(&KeyPath::parse("boarddata/w1").unwrap(), json!({"name": "Bass"}))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        task.abort();

        let reloaded = load_store(&path).unwrap();
        assert_eq!(reloaded.export(), json!({"boarddata": {"w1": {"name": "Bass"}}}));
    }

    #[test]
    fn test_unchanged_tree_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(MemoryStore::new(), dir.path().join("board.json"));
        assert!(persister.flush().unwrap());
        assert!(!persister.flush().unwrap());
    }
}
