/// Disk persistence for a `MemoryStore` tree.
///
/// - Atomic writes (write to .tmp, fsync, rename, fsync directory)
/// - SHA-256 content hash so unchanged trees are not rewritten
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::memory::MemoryStore;
use super::StoreError;

/// Load a tree from `path`. A missing file yields an empty store.
pub fn load_store(path: &Path) -> Result<MemoryStore, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let tree: Value = serde_json::from_str(&content)?;
            Ok(MemoryStore::from_value(tree))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("[bandboard.persist] No data file at {}, starting empty", path.display());
            Ok(MemoryStore::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Compute SHA-256 hash of content (for change detection).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Writes the store to one JSON file, skipping flushes that would not change it.
pub struct StoreFile {
    path: PathBuf,
    last_hash: Option<String>,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_hash: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the current tree. Returns true when the file was rewritten.
    pub fn flush(&mut self, store: &MemoryStore) -> Result<bool, StoreError> {
        let content = serde_json::to_string_pretty(&store.export())?;
        let hash = content_hash(&content);
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            return Ok(false);
        }
        atomic_write(&self.path, &content)?;
        log::debug!("[bandboard.persist] Flushed {} bytes to {}", content.len(), self.path.display());
        self.last_hash = Some(hash);
        Ok(true)
    }
}

/// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let tmp_path = path.with_extension("bandboard.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    // fsync directory for rename durability
    if let Some(dir) = path.parent() {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{path, RemoteStore};
    use serde_json::json;

    #[test]
    fn test_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("data").join("store.json");

        let store = MemoryStore::new();
        let conn = store.connect("writer");
        conn.write(&path::worker("w1"), json!({ "name": "Keys" })).unwrap();

        let mut file = StoreFile::new(&file_path);
        assert!(file.flush(&store).unwrap());
        // Same content: no rewrite.
        assert!(!file.flush(&store).unwrap());

        let reloaded = load_store(&file_path).unwrap();
        assert_eq!(reloaded.export(), store.export());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_store(&dir.path().join("nope.json")).unwrap();
        assert_eq!(store.export(), json!({}));
    }

    #[test]
    fn test_load_invalid_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("bad.json");
        fs::write(&file_path, "{ not json").unwrap();
        assert!(matches!(load_store(&file_path), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }
}
