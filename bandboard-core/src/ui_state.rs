/// Interaction state owned by the board root: which dialog is open and where
/// the current drag started. Lives exactly as long as the owning session.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialog", content = "id", rename_all = "camelCase")]
pub enum Dialog {
    AddWorker,
    EditWorker(String),
    AddCategory,
    EditCategory(String),
    Snapshots,
    Backup,
    Palette,
}

/// Where a dragged note came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragOrigin {
    pub worker_id: String,
    pub note_id: String,
    pub column: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    open_dialog: Option<Dialog>,
    drag_origin: Option<DragOrigin>,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_drag(&mut self, worker_id: &str, note_id: &str, column: u8) {
        self.drag_origin = Some(DragOrigin {
            worker_id: worker_id.to_string(),
            note_id: note_id.to_string(),
            column,
        });
    }

    pub fn drag_origin(&self) -> Option<&DragOrigin> {
        self.drag_origin.as_ref()
    }

    /// Consume the origin for a drop handler.
    pub fn take_drag_origin(&mut self) -> Option<DragOrigin> {
        self.drag_origin.take()
    }

    /// Page-level dragend: clears the origin whether or not a drop handled it.
    pub fn end_drag(&mut self) {
        self.drag_origin = None;
    }

    pub fn open_dialog(&mut self, dialog: Dialog) {
        self.open_dialog = Some(dialog);
    }

    pub fn close_dialog(&mut self) {
        self.open_dialog = None;
    }

    pub fn current_dialog(&self) -> Option<&Dialog> {
        self.open_dialog.as_ref()
    }
}
