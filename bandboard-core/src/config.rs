/// Board timing and sizing knobs shared by the client services and the backend.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardConfig {
    /// Locks older than this are free for everyone, including their holder.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    #[serde(default = "default_lock_renew_interval_ms")]
    pub lock_renew_interval_ms: u64,
    /// Upper bound of stored snapshots after each save.
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,
    #[serde(default = "default_inactivity_snapshot_delay_ms")]
    pub inactivity_snapshot_delay_ms: u64,
    /// Gap used when appending to a column.
    #[serde(default = "default_position_step")]
    pub position_step: f64,
}

fn default_lock_ttl_ms() -> u64 {
    120_000
}

fn default_lock_renew_interval_ms() -> u64 {
    60_000
}

fn default_snapshot_limit() -> usize {
    100
}

fn default_inactivity_snapshot_delay_ms() -> u64 {
    5 * 60 * 1000
}

fn default_position_step() -> f64 {
    1000.0
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: default_lock_ttl_ms(),
            lock_renew_interval_ms: default_lock_renew_interval_ms(),
            snapshot_limit: default_snapshot_limit(),
            inactivity_snapshot_delay_ms: default_inactivity_snapshot_delay_ms(),
            position_step: default_position_step(),
        }
    }
}

impl BoardConfig {
    pub fn lock_renew_interval(&self) -> Duration {
        Duration::from_millis(self.lock_renew_interval_ms)
    }

    pub fn inactivity_snapshot_delay(&self) -> Duration {
        Duration::from_millis(self.inactivity_snapshot_delay_ms)
    }
}

/// Load config from path. Returns defaults if the file is missing or unparsable.
pub fn load_board_config(path: &Path) -> BoardConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("[bandboard.config] Failed to parse {}: {}", path.display(), e);
            BoardConfig::default()
        }),
        Err(_) => {
            log::info!("[bandboard.config] No config at {}, using defaults", path.display());
            BoardConfig::default()
        }
    }
}
