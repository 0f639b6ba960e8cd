/// Board mutations issued by the UI.
///
/// Every note mutation follows the same three steps:
///   1. validate input and read whatever pre-mutation state it needs
///   2. issue the store writes (fire-and-forget: failures are logged, not returned)
///   3. record the matching `HistoryAction` built from the values read in step 1
///
/// Reads in step 1 propagate errors because nothing has been written yet.
/// `push` for new notes must succeed since the generated key names the note.
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::activity::ActivitySignal;
use crate::config::BoardConfig;
use crate::history::{HistoryAction, HistoryEngine};
use crate::lock::LockManager;
use crate::position::{append_position, cell_siblings, compute_position, DropTarget, PositionError};
use crate::store::{fields, path, read_typed, write_typed, KeyPath, RemoteStore, StoreError};
use crate::types::{is_valid_color, is_valid_column, palette_problem, Category, Note, Worker};
use crate::ui_state::UiState;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Column {0} out of range (0-2)")]
    ColumnOutOfRange(u8),

    #[error("Color {0} out of range (0-6)")]
    ColorOutOfRange(u8),

    #[error("Note text must not be empty")]
    EmptyText,

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Invalid due date {0:?}, expected YYYY-MM-DD")]
    InvalidDueDate(String),

    #[error("Note not found: {worker_id}/{note_id}")]
    NoteNotFound { worker_id: String, note_id: String },

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Invalid palette: {0}")]
    InvalidPalette(String),

    #[error("No drag in progress")]
    NoDragInProgress,

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Fields for a note about to be created; column and position are decided by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteDraft {
    pub text: String,
    pub color: Option<u8>,
    pub category_name: Option<String>,
    pub due_date: Option<String>,
}

impl NoteDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

pub struct BoardService {
    store: Arc<dyn RemoteStore>,
    locks: Arc<dyn LockManager>,
    history: HistoryEngine,
    config: BoardConfig,
}

impl BoardService {
    pub fn new(store: Arc<dyn RemoteStore>, locks: Arc<dyn LockManager>, config: BoardConfig) -> Self {
        let history = HistoryEngine::new(Arc::clone(&store));
        Self {
            store,
            locks,
            history,
            config,
        }
    }

    pub fn set_activity(&mut self, activity: ActivitySignal) {
        self.history.set_activity(activity);
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    pub fn locks(&self) -> &Arc<dyn LockManager> {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn undo(&mut self) -> Option<HistoryAction> {
        self.history.undo()
    }

    pub fn redo(&mut self) -> Option<HistoryAction> {
        self.history.redo()
    }

    // ── Notes ───────────────────────────────────────────────────────────────

    /// Move a note to `(to_worker, to_column)` at `target`. Returns the new position.
    pub fn move_note(
        &mut self,
        note_id: &str,
        from_worker: &str,
        to_worker: &str,
        to_column: u8,
        target: &DropTarget,
    ) -> Result<f64, BoardError> {
        if !is_valid_column(to_column) {
            return Err(BoardError::ColumnOutOfRange(to_column));
        }
        let note = self.read_note(from_worker, note_id)?;
        if from_worker != to_worker {
            self.ensure_worker(to_worker)?;
        }
        let target_notes = self.read_notes(to_worker)?;
        let siblings = cell_siblings(&target_notes, to_column, Some(note_id));
        let position = compute_position(&siblings, target, self.config.position_step)?;

        let source = path::note(from_worker, note_id);
        if from_worker == to_worker {
            let update = fields([("column", json!(to_column)), ("position", json!(position))]);
            self.fire("move", &source, self.store.update(&source, update));
        } else {
            let destination = path::note(to_worker, note_id);
            let moved = Note {
                column: to_column,
                position,
                ..note.clone()
            };
            let written = write_typed(self.store.as_ref(), &destination, &moved);
            let ok = written.is_ok();
            self.fire("move", &destination, written);
            if ok {
                self.fire("move", &source, self.store.delete(&source));
            }
        }

        self.history.register(HistoryAction::Move {
            note_id: note_id.to_string(),
            prev_worker_id: from_worker.to_string(),
            prev_col: note.column,
            prev_pos: note.position,
            new_worker_id: to_worker.to_string(),
            new_col: to_column,
            new_pos: position,
        });
        Ok(position)
    }

    /// Append a new note to the end of a cell. Returns the generated note id.
    pub fn add_note(
        &mut self,
        worker_id: &str,
        column: u8,
        draft: NoteDraft,
    ) -> Result<String, BoardError> {
        if !is_valid_column(column) {
            return Err(BoardError::ColumnOutOfRange(column));
        }
        let note = self.validate_draft(draft, column, 0.0)?;
        self.ensure_worker(worker_id)?;
        let siblings = cell_siblings(&self.read_notes(worker_id)?, column, None);
        let position = append_position(&siblings, self.config.position_step);
        self.create_note(worker_id, Note { position, ..note })
    }

    /// Delete a note. Returns the removed body.
    pub fn delete_note(&mut self, worker_id: &str, note_id: &str) -> Result<Note, BoardError> {
        let note = self.read_note(worker_id, note_id)?;
        let target = path::note(worker_id, note_id);
        self.fire("delete", &target, self.store.delete(&target));
        self.history.register(HistoryAction::Delete {
            note_id: note_id.to_string(),
            worker_id: worker_id.to_string(),
            note_data: note.clone(),
        });
        Ok(note)
    }

    /// Delete via drag-to-trash; also drops any lock on the note.
    pub fn trash_note(&mut self, worker_id: &str, note_id: &str) -> Result<Note, BoardError> {
        let note = self.delete_note(worker_id, note_id)?;
        self.locks.release(note_id);
        Ok(note)
    }

    /// Replace a note's text. Returns false when the text was unchanged.
    pub fn edit_text(
        &mut self,
        worker_id: &str,
        note_id: &str,
        text: &str,
    ) -> Result<bool, BoardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BoardError::EmptyText);
        }
        let note = self.read_note(worker_id, note_id)?;
        if note.text == text {
            return Ok(false);
        }
        let target = path::note(worker_id, note_id);
        self.fire(
            "edit text",
            &target,
            self.store.update(&target, fields([("text", json!(text))])),
        );
        self.history.register(HistoryAction::EditText {
            note_id: note_id.to_string(),
            worker_id: worker_id.to_string(),
            prev_text: note.text,
            new_text: text.to_string(),
        });
        Ok(true)
    }

    /// Set or clear a note's color. Returns false when the color was unchanged.
    pub fn edit_color(
        &mut self,
        worker_id: &str,
        note_id: &str,
        color: Option<u8>,
    ) -> Result<bool, BoardError> {
        if let Some(c) = color {
            if !is_valid_color(c) {
                return Err(BoardError::ColorOutOfRange(c));
            }
        }
        let note = self.read_note(worker_id, note_id)?;
        if note.color == color {
            return Ok(false);
        }
        let target = path::note(worker_id, note_id);
        let value = color.map_or(Value::Null, |c| json!(c));
        self.fire(
            "edit color",
            &target,
            self.store.update(&target, fields([("color", value)])),
        );
        self.history.register(HistoryAction::EditColor {
            note_id: note_id.to_string(),
            worker_id: worker_id.to_string(),
            prev_color: note.color,
            new_color: color,
        });
        Ok(true)
    }

    /// Create one note per category item at the end of the cell.
    /// Each note is recorded as its own ADD. Returns the new note ids in item order.
    pub fn apply_category_to_column(
        &mut self,
        category_id: &str,
        worker_id: &str,
        column: u8,
    ) -> Result<Vec<String>, BoardError> {
        if !is_valid_column(column) {
            return Err(BoardError::ColumnOutOfRange(column));
        }
        let category: Category = read_typed(self.store.as_ref(), &path::category(category_id))?
            .ok_or_else(|| BoardError::CategoryNotFound(category_id.to_string()))?;
        self.ensure_worker(worker_id)?;

        let siblings = cell_siblings(&self.read_notes(worker_id)?, column, None);
        let step = self.config.position_step;
        let mut position = append_position(&siblings, step);
        let mut created = Vec::new();
        for item in category.items.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
            let note = Note {
                text: item.to_string(),
                column,
                color: category.color,
                position,
                category_name: Some(category.name.clone()),
                due_date: None,
            };
            created.push(self.create_note(worker_id, note)?);
            position += step;
        }
        log::info!(
            "[bandboard.mutation] Pushed category {} into {}/{}: {} notes",
            category.name,
            worker_id,
            column,
            created.len()
        );
        Ok(created)
    }

    /// Drop the note being dragged onto a cell.
    pub fn drop_on_cell(
        &mut self,
        ui: &mut UiState,
        to_worker: &str,
        to_column: u8,
        target: &DropTarget,
    ) -> Result<f64, BoardError> {
        let origin = ui.take_drag_origin().ok_or(BoardError::NoDragInProgress)?;
        self.move_note(&origin.note_id, &origin.worker_id, to_worker, to_column, target)
    }

    /// Drop the note being dragged onto the trash.
    pub fn drop_on_trash(&mut self, ui: &mut UiState) -> Result<Note, BoardError> {
        let origin = ui.take_drag_origin().ok_or(BoardError::NoDragInProgress)?;
        self.trash_note(&origin.worker_id, &origin.note_id)
    }

    // ── Workers, categories, palette ────────────────────────────────────────

    pub fn add_worker(&mut self, name: &str, default_color: Option<u8>) -> Result<String, BoardError> {
        let name = validate_name(name)?;
        if let Some(c) = default_color {
            if !is_valid_color(c) {
                return Err(BoardError::ColorOutOfRange(c));
            }
        }
        let worker = Worker {
            name,
            default_color,
            notes: BTreeMap::new(),
        };
        let id = self
            .store
            .push(&path::boarddata(), serde_json::to_value(&worker).map_err(StoreError::from)?)?;
        Ok(id)
    }

    pub fn rename_worker(&mut self, worker_id: &str, name: &str) -> Result<(), BoardError> {
        let name = validate_name(name)?;
        self.ensure_worker(worker_id)?;
        let target = path::worker(worker_id);
        self.fire("rename worker", &target, self.store.update(&target, fields([("name", json!(name))])));
        Ok(())
    }

    /// Remove a worker row together with all of its notes.
    pub fn remove_worker(&mut self, worker_id: &str) -> Result<(), BoardError> {
        self.ensure_worker(worker_id)?;
        let target = path::worker(worker_id);
        self.fire("remove worker", &target, self.store.delete(&target));
        Ok(())
    }

    pub fn add_category(
        &mut self,
        name: &str,
        items: Vec<String>,
        color: Option<u8>,
    ) -> Result<String, BoardError> {
        let name = validate_name(name)?;
        if let Some(c) = color {
            if !is_valid_color(c) {
                return Err(BoardError::ColorOutOfRange(c));
            }
        }
        let existing: BTreeMap<String, Value> =
            read_typed(self.store.as_ref(), &path::categories())?.unwrap_or_default();
        let category = Category {
            name,
            items: clean_items(items),
            color,
            order: Some(existing.len() as u32),
        };
        let id = self.store.push(
            &path::categories(),
            serde_json::to_value(&category).map_err(StoreError::from)?,
        )?;
        Ok(id)
    }

    pub fn update_category(&mut self, category_id: &str, category: Category) -> Result<(), BoardError> {
        let name = validate_name(&category.name)?;
        if let Some(c) = category.color {
            if !is_valid_color(c) {
                return Err(BoardError::ColorOutOfRange(c));
            }
        }
        let target = path::category(category_id);
        if self.store.read(&target)?.is_none() {
            return Err(BoardError::CategoryNotFound(category_id.to_string()));
        }
        let category = Category {
            name,
            items: clean_items(category.items),
            ..category
        };
        self.fire(
            "update category",
            &target,
            write_typed(self.store.as_ref(), &target, &category),
        );
        Ok(())
    }

    pub fn remove_category(&mut self, category_id: &str) -> Result<(), BoardError> {
        let target = path::category(category_id);
        if self.store.read(&target)?.is_none() {
            return Err(BoardError::CategoryNotFound(category_id.to_string()));
        }
        self.fire("remove category", &target, self.store.delete(&target));
        Ok(())
    }

    /// Replace the seven palette colors (`#rrggbb`).
    pub fn set_custom_palette(&mut self, colors: &[String]) -> Result<(), BoardError> {
        if let Some(problem) = palette_problem(colors) {
            return Err(BoardError::InvalidPalette(problem));
        }
        let target = path::custom_palette();
        self.fire("set palette", &target, self.store.write(&target, json!(colors)));
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn create_note(&mut self, worker_id: &str, note: Note) -> Result<String, BoardError> {
        if !note.position.is_finite() {
            log::error!(
                "[bandboard.mutation] Non-finite position for new note in {}, not writing",
                worker_id
            );
            return Err(PositionError::NonFinite(DropTarget::Append).into());
        }
        let value = serde_json::to_value(&note).map_err(StoreError::from)?;
        let note_id = self.store.push(&path::notes(worker_id), value)?;
        self.history.register(HistoryAction::Add {
            note_id: note_id.clone(),
            worker_id: worker_id.to_string(),
            note_data: note,
        });
        Ok(note_id)
    }

    fn validate_draft(&self, draft: NoteDraft, column: u8, position: f64) -> Result<Note, BoardError> {
        let text = draft.text.trim();
        if text.is_empty() {
            return Err(BoardError::EmptyText);
        }
        if let Some(c) = draft.color {
            if !is_valid_color(c) {
                return Err(BoardError::ColorOutOfRange(c));
            }
        }
        if let Some(date) = &draft.due_date {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(BoardError::InvalidDueDate(date.clone()));
            }
        }
        Ok(Note {
            text: text.to_string(),
            column,
            color: draft.color,
            position,
            category_name: draft.category_name.filter(|c| !c.trim().is_empty()),
            due_date: draft.due_date,
        })
    }

    fn read_note(&self, worker_id: &str, note_id: &str) -> Result<Note, BoardError> {
        read_typed(self.store.as_ref(), &path::note(worker_id, note_id))?.ok_or_else(|| {
            BoardError::NoteNotFound {
                worker_id: worker_id.to_string(),
                note_id: note_id.to_string(),
            }
        })
    }

    fn read_notes(&self, worker_id: &str) -> Result<BTreeMap<String, Note>, BoardError> {
        Ok(read_typed(self.store.as_ref(), &path::notes(worker_id))?.unwrap_or_default())
    }

    fn ensure_worker(&self, worker_id: &str) -> Result<(), BoardError> {
        match self.store.read(&path::worker(worker_id))? {
            Some(_) => Ok(()),
            None => Err(BoardError::WorkerNotFound(worker_id.to_string())),
        }
    }

    fn fire(&self, op: &str, target: &KeyPath, result: Result<(), StoreError>) {
        if let Err(e) = result {
            log::warn!("[bandboard.mutation] {} on {} failed: {}", op, target, e);
        }
    }
}

fn validate_name(name: &str) -> Result<String, BoardError> {
    let name = name.trim();
    if name.is_empty() {
        Err(BoardError::EmptyName)
    } else {
        Ok(name.to_string())
    }
}

fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect()
}
