/// Client-side copy of the four subscribed trees.
///
/// The store is the only source of truth: every change re-reads the touched
/// root and replaces the local copy wholesale. Nothing is merged.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::position::sorted_cell;
use crate::presence;
use crate::store::{path, read_typed, KeyPath, RemoteStore, StoreError, StoreEvent};
use crate::types::{Category, LockRecord, Note, PresenceRecord, Worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRoot {
    Board,
    Categories,
    Locks,
    Presence,
    Palette,
}

impl ViewRoot {
    pub const ALL: [ViewRoot; 5] = [
        ViewRoot::Board,
        ViewRoot::Categories,
        ViewRoot::Locks,
        ViewRoot::Presence,
        ViewRoot::Palette,
    ];

    /// The root an event path falls under; root-level writes touch every root.
    pub fn of(event_path: &KeyPath) -> Vec<ViewRoot> {
        match event_path.first() {
            None => Self::ALL.to_vec(),
            Some(path::BOARDDATA) => vec![ViewRoot::Board],
            Some(path::CATEGORIES) => vec![ViewRoot::Categories],
            Some(path::LOCKS) => vec![ViewRoot::Locks],
            Some(path::PRESENCE) => vec![ViewRoot::Presence],
            Some(path::CUSTOM_PALETTE) => vec![ViewRoot::Palette],
            Some(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardView {
    board: BTreeMap<String, Worker>,
    categories: BTreeMap<String, Category>,
    locks: BTreeMap<String, LockRecord>,
    presence: BTreeMap<String, PresenceRecord>,
    palette: Option<Vec<String>>,
}

impl BoardView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read every root.
    pub fn refresh(&mut self, store: &dyn RemoteStore) -> Result<(), StoreError> {
        for root in ViewRoot::ALL {
            self.reload(store, root)?;
        }
        Ok(())
    }

    /// Re-read whatever `event` touched. Returns false for paths the view ignores.
    pub fn apply(&mut self, store: &dyn RemoteStore, event: &StoreEvent) -> Result<bool, StoreError> {
        let roots = ViewRoot::of(&event.path);
        for root in &roots {
            self.reload(store, *root)?;
        }
        Ok(!roots.is_empty())
    }

    fn reload(&mut self, store: &dyn RemoteStore, root: ViewRoot) -> Result<(), StoreError> {
        match root {
            ViewRoot::Board => self.board = read_entries(store, &path::boarddata())?,
            ViewRoot::Categories => self.categories = read_entries(store, &path::categories())?,
            ViewRoot::Locks => self.locks = read_entries(store, &path::locks())?,
            ViewRoot::Presence => self.presence = read_entries(store, &path::presence())?,
            ViewRoot::Palette => {
                self.palette = read_typed(store, &path::custom_palette()).unwrap_or_else(|e| {
                    log::debug!("[bandboard.view] Ignoring malformed palette: {}", e);
                    None
                })
            }
        }
        Ok(())
    }

    pub fn worker(&self, worker_id: &str) -> Option<&Worker> {
        self.board.get(worker_id)
    }

    /// Workers sorted by name.
    pub fn workers(&self) -> Vec<(&str, &Worker)> {
        let mut workers: Vec<(&str, &Worker)> =
            self.board.iter().map(|(id, w)| (id.as_str(), w)).collect();
        workers.sort_by(|a, b| a.1.name.cmp(&b.1.name).then_with(|| a.0.cmp(b.0)));
        workers
    }

    /// One cell, sorted by position.
    pub fn cell(&self, worker_id: &str, column: u8) -> Vec<(&str, &Note)> {
        self.board
            .get(worker_id)
            .map(|w| sorted_cell(&w.notes, column))
            .unwrap_or_default()
    }

    /// Categories by `order`, unordered ones last, then by name.
    pub fn categories(&self) -> Vec<(&str, &Category)> {
        let mut categories: Vec<(&str, &Category)> =
            self.categories.iter().map(|(id, c)| (id.as_str(), c)).collect();
        categories.sort_by(|a, b| {
            let ka = (a.1.order.unwrap_or(u32::MAX), &a.1.name);
            let kb = (b.1.order.unwrap_or(u32::MAX), &b.1.name);
            ka.cmp(&kb)
        });
        categories
    }

    pub fn lock(&self, note_id: &str) -> Option<&LockRecord> {
        self.locks.get(note_id)
    }

    pub fn is_locked_by_other(&self, note_id: &str, user_id: &str, now_ms: u64, ttl_ms: u64) -> bool {
        self.locks
            .get(note_id)
            .is_some_and(|lock| lock.is_held_by_other(now_ms, ttl_ms, user_id))
    }

    pub fn online_users(&self) -> Vec<&PresenceRecord> {
        presence::online_users(&self.presence)
    }

    pub fn palette(&self) -> Option<&[String]> {
        self.palette.as_deref()
    }
}

/// Read a keyed collection, skipping entries that do not deserialize.
fn read_entries<T: DeserializeOwned>(
    store: &dyn RemoteStore,
    root: &KeyPath,
) -> Result<BTreeMap<String, T>, StoreError> {
    let raw: Map<String, Value> = match store.read(root)? {
        Some(Value::Object(map)) => map,
        Some(other) => {
            log::debug!("[bandboard.view] Expected an object at {}, got {}", root, other);
            return Ok(BTreeMap::new());
        }
        None => return Ok(BTreeMap::new()),
    };
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<T>(value) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                log::debug!("[bandboard.view] Skipping malformed entry {}/{}: {}", root, key, e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_value(json!({
            "boarddata": {
                "w2": {"name": "Drums", "notes": {
                    "a": {"text": "A", "column": 0, "position": 2000.0},
                    "b": {"text": "B", "column": 0, "position": 1000.0},
                    "c": {"text": "C", "column": 2, "position": 1.0}
                }},
                "w1": {"name": "Bass"}
            },
            "categories": {
                "x": {"name": "Zeta", "items": ["1"]},
                "y": {"name": "Alpha", "items": ["1"], "order": 1},
                "z": {"name": "Beta", "items": ["1"], "order": 0}
            },
            "locks": {
                "a": {"userId": "u2", "userName": "Bob", "timestamp": 100_000},
                "b": {"timestamp": 100_000}
            }
        }))
    }

    #[test]
    fn test_refresh_and_accessors() {
        let store = store();
        let conn = store.connect("c");
        let mut view = BoardView::new();
        view.refresh(&conn).unwrap();

        let workers: Vec<&str> = view.workers().iter().map(|(_, w)| w.name.as_str()).collect();
        assert_eq!(workers, vec!["Bass", "Drums"]);

        let cell: Vec<&str> = view.cell("w2", 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(cell, vec!["b", "a"]);
        assert!(view.cell("missing", 0).is_empty());

        let categories: Vec<&str> = view.categories().iter().map(|(_, c)| c.name.as_str()).collect();
        assert_eq!(categories, vec!["Beta", "Alpha", "Zeta"]);

        // The timestamp-only record is treated as no lock.
        assert!(view.lock("b").is_none());
        assert!(view.is_locked_by_other("a", "u1", 150_000, 120_000));
        assert!(!view.is_locked_by_other("a", "u2", 150_000, 120_000));
        assert!(!view.is_locked_by_other("a", "u1", 221_000, 120_000));
    }

    #[test]
    fn test_apply_replaces_touched_root() {
        let store = store();
        let conn = store.connect("c");
        let mut events = conn.subscribe();
        let mut view = BoardView::new();
        view.refresh(&conn).unwrap();

        conn.delete(&path::note("w2", "a")).unwrap();
        conn.write(&path::custom_palette(), json!(["#000000"])).unwrap();
        while let Ok(event) = events.try_recv() {
            assert!(view.apply(&conn, &event).unwrap());
        }

        let cell: Vec<&str> = view.cell("w2", 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(cell, vec!["b"]);
        assert_eq!(view.palette(), Some(&["#000000".to_string()][..]));

        let stray = StoreEvent {
            path: KeyPath::parse("elsewhere").unwrap(),
            value: None,
        };
        assert!(!view.apply(&conn, &stray).unwrap());
    }
}
