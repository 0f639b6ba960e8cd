/// JSON backup files: `{version, timestamp, boardData?, categories?, customColors?}`.
///
/// Import validates the whole file before touching the store, then overwrites
/// each tree that is present verbatim.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::store::{path, read_typed, write_typed, RemoteStore, StoreError};
use crate::types::{palette_problem, Category, Worker};

pub const BACKUP_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Backup contains neither boardData nor categories")]
    Empty,

    #[error("Backup field {field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_colors: Option<Vec<String>>,
}

fn default_version() -> u32 {
    BACKUP_VERSION
}

impl BackupFile {
    pub fn parse(raw: &str) -> Result<Self, BackupError> {
        let file: BackupFile = serde_json::from_str(raw)?;
        if file.board_data.is_none() && file.categories.is_none() {
            return Err(BackupError::Empty);
        }
        if let Some(board_data) = &file.board_data {
            check_tree::<Worker>("boardData", board_data)?;
        }
        if let Some(categories) = &file.categories {
            check_tree::<Category>("categories", categories)?;
        }
        if let Some(reason) = file.custom_colors.as_deref().and_then(palette_problem) {
            return Err(BackupError::Invalid {
                field: "customColors",
                reason,
            });
        }
        if file.version != BACKUP_VERSION {
            log::warn!(
                "[bandboard.backup] Unknown backup version {}, importing anyway",
                file.version
            );
        }
        Ok(file)
    }

    pub fn to_json_pretty(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Suggested download name, e.g. `bandboard-backup-2026-10-19.json`.
    pub fn file_name(&self) -> String {
        let date = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.timestamp as i64)
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        format!("bandboard-backup-{}.json", date)
    }
}

/// A tree must be an object of `T` records keyed by id.
fn check_tree<T: DeserializeOwned>(field: &'static str, tree: &Value) -> Result<(), BackupError> {
    if !tree.is_object() {
        return Err(BackupError::Invalid {
            field,
            reason: "expected an object".to_string(),
        });
    }
    serde_json::from_value::<BTreeMap<String, T>>(tree.clone())
        .map(|_| ())
        .map_err(|e| BackupError::Invalid {
            field,
            reason: e.to_string(),
        })
}

/// Read the board, categories and palette into a backup. Missing trees export as `{}`.
pub fn export(store: &dyn RemoteStore, clock: &dyn Clock) -> Result<BackupFile, BackupError> {
    let empty = || Value::Object(Map::new());
    let board_data = store.read(&path::boarddata())?.unwrap_or_else(empty);
    let categories = store.read(&path::categories())?.unwrap_or_else(empty);
    let custom_colors: Option<Vec<String>> = read_typed(store, &path::custom_palette())?;
    Ok(BackupFile {
        version: BACKUP_VERSION,
        timestamp: clock.now_ms(),
        board_data: Some(board_data),
        categories: Some(categories),
        custom_colors,
    })
}

/// Parse `raw` and overwrite the trees it contains.
pub fn import(store: &dyn RemoteStore, raw: &str) -> Result<BackupFile, BackupError> {
    let file = BackupFile::parse(raw)?;
    apply(store, &file)?;
    Ok(file)
}

pub fn apply(store: &dyn RemoteStore, file: &BackupFile) -> Result<(), BackupError> {
    if let Some(board_data) = &file.board_data {
        store.write(&path::boarddata(), board_data.clone())?;
    }
    if let Some(categories) = &file.categories {
        store.write(&path::categories(), categories.clone())?;
    }
    if let Some(colors) = &file.custom_colors {
        write_typed(store, &path::custom_palette(), colors)?;
    }
    log::info!(
        "[bandboard.backup] Imported backup from {} (board: {}, categories: {}, palette: {})",
        file.timestamp,
        file.board_data.is_some(),
        file.categories.is_some(),
        file.custom_colors.is_some()
    );
    Ok(())
}
