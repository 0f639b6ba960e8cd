/// Configuration for the bandboard backend.
/// Reads server.json from ~/.config/bandboard/server.json (or platform equivalent).
use bandboard_core::config::BoardConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Where the store tree is persisted. Defaults to the platform data dir.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default)]
    pub board: BoardConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_flush_interval_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            data_file: None,
            flush_interval_secs: default_flush_interval_secs(),
            board: BoardConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn data_file(&self) -> PathBuf {
        self.data_file.clone().unwrap_or_else(default_data_file)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

/// Default config path: ~/.config/bandboard/server.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bandboard")
        .join("server.json")
}

/// Default store file: ~/.local/share/bandboard/board.json
pub fn default_data_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bandboard")
        .join("board.json")
}

/// Load config from path. Returns default if the file is missing or invalid.
pub fn load_config(path: &Path) -> ServerConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse config {}: {}", path.display(), e);
            ServerConfig::default()
        }),
        Err(_) => {
            log::info!("No config at {}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        fs::write(&path, r#"{"port": 9000, "board": {"snapshotLimit": 20}}"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.board.snapshot_limit, 20);
        assert_eq!(config.board.lock_ttl_ms, 120_000);
    }

    #[test]
    fn test_missing_or_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(&dir.path().join("nope.json")).port, 8080);

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{port").unwrap();
        assert_eq!(load_config(&bad).port, 8080);
    }
}
