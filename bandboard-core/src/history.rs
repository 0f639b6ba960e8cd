/// Undo/redo log for note mutations.
///
/// Two LIFO stacks: `history` (applied) and `future` (undone). Recording a new
/// action clears `future`; there is no branching. Undo and redo move the
/// action between stacks first and then issue compensating writes straight to
/// the store, so a failed compensating write still consumes the action.
///
/// MOVE only captures worker/column/position. Undo and redo re-read the
/// note's current body and patch those three fields, so text or color edits
/// made by anyone between the move and its undo survive.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::activity::ActivitySignal;
use crate::store::{fields, path, read_typed, write_typed, KeyPath, RemoteStore, StoreError};
use crate::types::Note;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum HistoryAction {
    Move {
        note_id: String,
        prev_worker_id: String,
        prev_col: u8,
        prev_pos: f64,
        new_worker_id: String,
        new_col: u8,
        new_pos: f64,
    },
    Add {
        note_id: String,
        worker_id: String,
        note_data: Note,
    },
    Delete {
        note_id: String,
        worker_id: String,
        note_data: Note,
    },
    EditText {
        note_id: String,
        worker_id: String,
        prev_text: String,
        new_text: String,
    },
    EditColor {
        note_id: String,
        worker_id: String,
        prev_color: Option<u8>,
        new_color: Option<u8>,
    },
}

impl HistoryAction {
    pub fn note_id(&self) -> &str {
        match self {
            HistoryAction::Move { note_id, .. }
            | HistoryAction::Add { note_id, .. }
            | HistoryAction::Delete { note_id, .. }
            | HistoryAction::EditText { note_id, .. }
            | HistoryAction::EditColor { note_id, .. } => note_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HistoryAction::Move { .. } => "MOVE",
            HistoryAction::Add { .. } => "ADD",
            HistoryAction::Delete { .. } => "DELETE",
            HistoryAction::EditText { .. } => "EDIT_TEXT",
            HistoryAction::EditColor { .. } => "EDIT_COLOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

pub struct HistoryEngine {
    store: Arc<dyn RemoteStore>,
    history: Vec<HistoryAction>,
    future: Vec<HistoryAction>,
    activity: Option<ActivitySignal>,
}

impl HistoryEngine {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            history: Vec::new(),
            future: Vec::new(),
            activity: None,
        }
    }

    /// Signal `activity` whenever an action is recorded.
    pub fn set_activity(&mut self, activity: ActivitySignal) {
        self.activity = Some(activity);
    }

    /// Record an already-applied action.
    pub fn register(&mut self, action: HistoryAction) {
        log::debug!(
            "[bandboard.history] Recorded {} on {}",
            action.kind(),
            action.note_id()
        );
        self.history.push(action);
        self.future.clear();
        if let Some(activity) = &self.activity {
            activity.touch();
        }
    }

    /// Revert the most recent action. Returns it, or `None` if there was nothing to undo.
    pub fn undo(&mut self) -> Option<HistoryAction> {
        let action = self.history.pop()?;
        self.future.push(action.clone());
        self.apply(&action, Direction::Undo);
        Some(action)
    }

    /// Re-apply the most recently undone action.
    pub fn redo(&mut self) -> Option<HistoryAction> {
        let action = self.future.pop()?;
        self.history.push(action.clone());
        self.apply(&action, Direction::Redo);
        Some(action)
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Applied actions, oldest first.
    pub fn history(&self) -> &[HistoryAction] {
        &self.history
    }

    /// Undone actions, oldest undo last.
    pub fn future(&self) -> &[HistoryAction] {
        &self.future
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.future.clear();
    }

    fn apply(&self, action: &HistoryAction, direction: Direction) {
        log::info!(
            "[bandboard.history] {:?} {} on {}",
            direction,
            action.kind(),
            action.note_id()
        );
        match (action, direction) {
            (
                HistoryAction::Move {
                    note_id,
                    prev_worker_id,
                    prev_col,
                    prev_pos,
                    new_worker_id,
                    ..
                },
                Direction::Undo,
            ) => self.relocate(note_id, new_worker_id, prev_worker_id, *prev_col, *prev_pos),
            (
                HistoryAction::Move {
                    note_id,
                    prev_worker_id,
                    new_worker_id,
                    new_col,
                    new_pos,
                    ..
                },
                Direction::Redo,
            ) => self.relocate(note_id, prev_worker_id, new_worker_id, *new_col, *new_pos),
            (
                HistoryAction::Add {
                    note_id, worker_id, ..
                },
                Direction::Undo,
            )
            | (
                HistoryAction::Delete {
                    note_id, worker_id, ..
                },
                Direction::Redo,
            ) => {
                let target = path::note(worker_id, note_id);
                self.logged("delete", &target, self.store.delete(&target));
            }
            (
                HistoryAction::Add {
                    note_id,
                    worker_id,
                    note_data,
                },
                Direction::Redo,
            )
            | (
                HistoryAction::Delete {
                    note_id,
                    worker_id,
                    note_data,
                },
                Direction::Undo,
            ) => {
                let target = path::note(worker_id, note_id);
                self.logged(
                    "recreate",
                    &target,
                    write_typed(self.store.as_ref(), &target, note_data),
                );
            }
            (
                HistoryAction::EditText {
                    note_id,
                    worker_id,
                    prev_text,
                    new_text,
                },
                direction,
            ) => {
                let text = match direction {
                    Direction::Undo => prev_text,
                    Direction::Redo => new_text,
                };
                self.patch_existing(worker_id, note_id, "text", json!(text));
            }
            (
                HistoryAction::EditColor {
                    note_id,
                    worker_id,
                    prev_color,
                    new_color,
                },
                direction,
            ) => {
                let color = match direction {
                    Direction::Undo => prev_color,
                    Direction::Redo => new_color,
                };
                let value = color.map_or(Value::Null, |c| json!(c));
                self.patch_existing(worker_id, note_id, "color", value);
            }
        }
    }

    /// Move the live note body from `from_worker` to the given coordinates.
    fn relocate(
        &self,
        note_id: &str,
        from_worker: &str,
        to_worker: &str,
        column: u8,
        position: f64,
    ) {
        let source = path::note(from_worker, note_id);
        let current = match read_typed::<Note>(self.store.as_ref(), &source) {
            Ok(Some(note)) => note,
            Ok(None) => {
                log::debug!("[bandboard.history] {} no longer exists, nothing to move", source);
                return;
            }
            Err(e) => {
                log::warn!("[bandboard.history] Could not read {}: {}", source, e);
                return;
            }
        };

        if from_worker == to_worker {
            let update = fields([("column", json!(column)), ("position", json!(position))]);
            self.logged("reposition", &source, self.store.update(&source, update));
            return;
        }

        let target = path::note(to_worker, note_id);
        let moved = Note {
            column,
            position,
            ..current
        };
        let written = write_typed(self.store.as_ref(), &target, &moved);
        let ok = written.is_ok();
        self.logged("write", &target, written);
        if ok {
            self.logged("delete", &source, self.store.delete(&source));
        }
    }

    /// Update one field of a note, unless the note has disappeared meanwhile.
    fn patch_existing(&self, worker_id: &str, note_id: &str, field: &str, value: Value) {
        let target = path::note(worker_id, note_id);
        match self.store.read(&target) {
            Ok(Some(_)) => {
                let update = fields([(field, value)]);
                self.logged("update", &target, self.store.update(&target, update));
            }
            Ok(None) => {
                log::debug!("[bandboard.history] {} no longer exists, skipping {}", target, field);
            }
            Err(e) => {
                log::warn!("[bandboard.history] Could not read {}: {}", target, e);
            }
        }
    }

    fn logged(&self, op: &str, target: &KeyPath, result: Result<(), StoreError>) {
        if let Err(e) = result {
            log::warn!("[bandboard.history] {} of {} failed: {}", op, target, e);
        }
    }
}
