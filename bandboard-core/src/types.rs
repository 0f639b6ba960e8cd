use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid hex color regex"));

/// Columns every worker row is split into.
pub const COLUMN_COUNT: u8 = 3;

/// Highest palette index a note color may reference.
pub const MAX_COLOR_INDEX: u8 = 6;

/// Number of entries in the custom palette.
pub const PALETTE_SIZE: usize = 7;

/// A sticky note inside one worker row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    pub column: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u8>,
    pub position: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl Note {
    pub fn new(text: impl Into<String>, column: u8, position: f64) -> Self {
        Self {
            text: text.into(),
            column,
            color: None,
            position,
            category_name: None,
            due_date: None,
        }
    }
}

/// A worker row: `boarddata/{workerId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_color: Option<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, Note>,
}

/// A note template: pushing it into a column creates one note per item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// Advisory lock on a note: `locks/{noteId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub user_id: String,
    pub user_name: String,
    /// Epoch milliseconds of acquire or last renewal.
    pub timestamp: u64,
}

impl LockRecord {
    /// A lock is valid while it is younger than `ttl_ms`.
    /// Timestamps ahead of `now_ms` (clock skew between clients) count as fresh.
    pub fn is_valid(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) < ttl_ms
    }

    pub fn is_held_by_other(&self, now_ms: u64, ttl_ms: u64, user_id: &str) -> bool {
        self.is_valid(now_ms, ttl_ms) && self.user_id != user_id
    }
}

/// Online indicator: `presence/{userId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub user_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub online: bool,
    pub last_active: u64,
}

/// Immutable full copy of the board: `snapshots/{snapshotId}`.
///
/// The trees are kept as raw JSON so a restore writes back exactly what was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub title: String,
    pub timestamp: u64,
    #[serde(default)]
    pub board_data: serde_json::Value,
    #[serde(default)]
    pub categories: serde_json::Value,
    pub created_by: String,
    pub creator_id: String,
}

/// Signed-in user as seen by the board. Authentication happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            photo_url: None,
        }
    }
}

/// `boarddata` tree keyed by worker id.
pub type BoardData = BTreeMap<String, Worker>;

/// `categories` tree keyed by category id.
pub type Categories = BTreeMap<String, Category>;

/// Whether `column` is one of the board's columns.
pub fn is_valid_column(column: u8) -> bool {
    column < COLUMN_COUNT
}

/// Whether `color` indexes into the palette.
pub fn is_valid_color(color: u8) -> bool {
    color <= MAX_COLOR_INDEX
}

/// Why `colors` is not a usable custom palette, if it isn't.
/// A palette is exactly `PALETTE_SIZE` `#rrggbb` entries.
pub fn palette_problem(colors: &[String]) -> Option<String> {
    if colors.len() != PALETTE_SIZE {
        return Some(format!("expected {} colors, got {}", PALETTE_SIZE, colors.len()));
    }
    colors
        .iter()
        .find(|c| !HEX_COLOR_RE.is_match(c))
        .map(|bad| format!("{:?} is not #rrggbb", bad))
}
