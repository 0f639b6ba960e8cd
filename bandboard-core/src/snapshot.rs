/// Full-board snapshots under `snapshots/{key}`, bounded to the configured limit.
///
/// Before every save the oldest entries are pruned so that, after the new
/// snapshot lands, at most `limit` remain. Pruning is one batched update with
/// a `null` field per victim.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::store::{path, read_typed, RemoteStore, StoreError};
use crate::types::{Snapshot, UserIdentity};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What triggered a snapshot. Decides its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotReason {
    Login,
    Inactivity,
    Logout,
    Manual(String),
}

impl SnapshotReason {
    pub fn title(&self, timestamp_ms: u64) -> String {
        let label = match self {
            SnapshotReason::Login => "Auto-save (login)",
            SnapshotReason::Inactivity => "Auto-save (inactivity)",
            SnapshotReason::Logout => "Auto-save (logout)",
            SnapshotReason::Manual(title) if !title.trim().is_empty() => return title.trim().to_string(),
            SnapshotReason::Manual(_) => "Manual snapshot",
        };
        match DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64) {
            Some(at) => format!("{} {}", label, at.format("%Y-%m-%d %H:%M UTC")),
            None => label.to_string(),
        }
    }
}

/// Only the field pruning sorts by; the rest of a snapshot is never parsed here.
#[derive(Deserialize)]
struct Stamp {
    #[serde(default)]
    timestamp: u64,
}

pub struct SnapshotService {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    limit: usize,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, limit: usize) -> Self {
        Self {
            store,
            clock,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Prune, then append a snapshot of the given trees. Returns the new key.
    /// A failed prune is logged and the save goes ahead.
    pub fn save_snapshot(
        &self,
        reason: &SnapshotReason,
        board_data: Value,
        categories: Value,
        user: &UserIdentity,
    ) -> Result<String, SnapshotError> {
        if let Err(e) = self.prune() {
            log::warn!("[bandboard.snapshot] Pruning failed, saving anyway: {}", e);
        }
        let timestamp = self.clock.now_ms();
        let snapshot = Snapshot {
            title: reason.title(timestamp),
            timestamp,
            board_data,
            categories,
            created_by: user.name.clone(),
            creator_id: user.id.clone(),
        };
        let key = self.store.push(
            &path::snapshots(),
            serde_json::to_value(&snapshot).map_err(StoreError::from)?,
        )?;
        log::info!("[bandboard.snapshot] Saved {:?} as {}", snapshot.title, key);
        Ok(key)
    }

    /// Snapshot whatever `boarddata` and `categories` currently hold.
    pub fn capture(&self, reason: &SnapshotReason, user: &UserIdentity) -> Result<String, SnapshotError> {
        let board_data = self.store.read(&path::boarddata())?.unwrap_or(Value::Null);
        let categories = self.store.read(&path::categories())?.unwrap_or(Value::Null);
        self.save_snapshot(reason, board_data, categories, user)
    }

    /// Delete the oldest snapshots so one more fits under the limit.
    /// Returns how many were scheduled for deletion.
    pub fn prune(&self) -> Result<usize, SnapshotError> {
        let existing: Map<String, Value> =
            read_typed(self.store.as_ref(), &path::snapshots())?.unwrap_or_default();
        if existing.len() < self.limit {
            return Ok(0);
        }

        // Unreadable entries sort first and are pruned first.
        let mut stamped: Vec<(u64, String)> = existing
            .into_iter()
            .map(|(key, value)| {
                let ts = serde_json::from_value::<Stamp>(value).map_or(0, |s| s.timestamp);
                (ts, key)
            })
            .collect();
        stamped.sort();

        let excess = stamped.len() - (self.limit - 1);
        let victims: Map<String, Value> = stamped
            .into_iter()
            .take(excess)
            .map(|(_, key)| (key, Value::Null))
            .collect();
        self.store.update(&path::snapshots(), victims)?;
        log::info!("[bandboard.snapshot] Pruned {} old snapshots", excess);
        Ok(excess)
    }

    /// All snapshots, newest first. Malformed entries are skipped.
    pub fn list(&self) -> Result<Vec<(String, Snapshot)>, SnapshotError> {
        let existing: Map<String, Value> =
            read_typed(self.store.as_ref(), &path::snapshots())?.unwrap_or_default();
        let mut snapshots: Vec<(String, Snapshot)> = existing
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<Snapshot>(value) {
                Ok(snapshot) => Some((key, snapshot)),
                Err(e) => {
                    log::debug!("[bandboard.snapshot] Skipping malformed snapshot {}: {}", key, e);
                    None
                }
            })
            .collect();
        snapshots.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then_with(|| b.0.cmp(&a.0)));
        Ok(snapshots)
    }

    pub fn get(&self, snapshot_id: &str) -> Result<Snapshot, SnapshotError> {
        read_typed(self.store.as_ref(), &path::snapshot(snapshot_id))?
            .ok_or_else(|| SnapshotError::NotFound(snapshot_id.to_string()))
    }

    /// Overwrite `boarddata` and `categories` with the snapshot's trees.
    pub fn restore(&self, snapshot_id: &str) -> Result<Snapshot, SnapshotError> {
        let snapshot = self.get(snapshot_id)?;
        let result = self
            .store
            .write(&path::boarddata(), snapshot.board_data.clone())
            .and_then(|_| self.store.write(&path::categories(), snapshot.categories.clone()));
        if let Err(e) = result {
            log::error!("[bandboard.snapshot] Restore of {} failed: {}", snapshot_id, e);
            return Err(e.into());
        }
        log::info!("[bandboard.snapshot] Restored {:?}", snapshot.title);
        Ok(snapshot)
    }

    pub fn delete(&self, snapshot_id: &str) -> Result<(), SnapshotError> {
        let target = path::snapshot(snapshot_id);
        if self.store.read(&target)?.is_none() {
            return Err(SnapshotError::NotFound(snapshot_id.to_string()));
        }
        self.store.delete(&target)?;
        Ok(())
    }
}
