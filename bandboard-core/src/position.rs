/// Fractional ordering keys for drag-and-drop.
///
/// Notes in one (worker, column) cell are ordered by a float `position`.
/// A drop only ever computes a key for the moved note; siblings keep theirs.
///
///   append             -> last + step        (step when the cell is empty)
///   before S (prev P)  -> (P + S) / 2        (S / 2 without P)
///   after S (next N)   -> (S + N) / 2        (S + step without N)
///
/// Repeated drops into the same gap halve it each time and will eventually
/// collide at f64 precision. There is no rebalancing pass.
use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Note;

pub const DEFAULT_STEP: f64 = 1000.0;

/// Where a dragged note was released inside a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "siblingId", rename_all = "camelCase")]
pub enum DropTarget {
    /// Empty space after the last note.
    Append,
    /// Left half of a sibling note.
    Before(String),
    /// Right half of a sibling note.
    After(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("Computed position is not finite for target {0:?}")]
    NonFinite(DropTarget),
}

/// Order two positions the way every client sorts a cell.
pub fn compare_positions(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

/// Notes of `column`, sorted by position.
pub fn sorted_cell<'a>(notes: &'a BTreeMap<String, Note>, column: u8) -> Vec<(&'a str, &'a Note)> {
    let mut cell: Vec<(&str, &Note)> = notes
        .iter()
        .filter(|(_, note)| note.column == column)
        .map(|(id, note)| (id.as_str(), note))
        .collect();
    cell.sort_by(|a, b| compare_positions(a.1.position, b.1.position));
    cell
}

/// Sorted `(id, position)` pairs of a cell, without the note being moved.
pub fn cell_siblings(
    notes: &BTreeMap<String, Note>,
    column: u8,
    moving_note_id: Option<&str>,
) -> Vec<(String, f64)> {
    sorted_cell(notes, column)
        .into_iter()
        .filter(|(id, _)| Some(*id) != moving_note_id)
        .map(|(id, note)| (id.to_string(), note.position))
        .collect()
}

pub fn append_position(siblings: &[(String, f64)], step: f64) -> f64 {
    match siblings.last() {
        Some((_, last)) => last + step,
        None => step,
    }
}

/// Position for a drop. `siblings` must be sorted and exclude the moved note.
/// An unknown sibling id falls back to appending.
pub fn compute_position(
    siblings: &[(String, f64)],
    target: &DropTarget,
    step: f64,
) -> Result<f64, PositionError> {
    let position = match target {
        DropTarget::Append => append_position(siblings, step),
        DropTarget::Before(sibling_id) => match index_of(siblings, sibling_id) {
            Some(0) => siblings[0].1 / 2.0,
            Some(i) => (siblings[i - 1].1 + siblings[i].1) / 2.0,
            None => append_position(siblings, step),
        },
        DropTarget::After(sibling_id) => match index_of(siblings, sibling_id) {
            Some(i) if i + 1 < siblings.len() => (siblings[i].1 + siblings[i + 1].1) / 2.0,
            Some(i) => siblings[i].1 + step,
            None => append_position(siblings, step),
        },
    };
    if !position.is_finite() {
        log::error!("[bandboard.position] Non-finite position for {:?}, refusing to move", target);
        return Err(PositionError::NonFinite(target.clone()));
    }
    Ok(position)
}

fn index_of(siblings: &[(String, f64)], id: &str) -> Option<usize> {
    siblings.iter().position(|(sid, _)| sid == id)
}
