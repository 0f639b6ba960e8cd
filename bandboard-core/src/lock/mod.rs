//! Advisory per-note editing locks.
//!
//! A lock is a `{userId, userName, timestamp}` record at `locks/{noteId}`.
//! Acquire is an unconditional overwrite (last click wins) backed by a
//! disconnect-triggered delete; expiry is computed by readers from the
//! timestamp, nothing ever writes an expiry. Exclusion only holds as far as
//! callers consult `is_locked_by_other` before starting a drag or edit.

pub mod session;

use std::sync::Arc;

use serde_json::json;

use crate::clock::Clock;
use crate::store::{fields, path, read_typed, DisconnectAction, RemoteStore};
use crate::types::{LockRecord, UserIdentity};

pub use session::NoteInteraction;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Note {note_id} is being edited by {user_name}")]
    HeldByOther { note_id: String, user_name: String },
}

/// Lock backend seam. Every mutating call is fire-and-forget: failures are
/// logged and the next subscription update corrects the UI.
pub trait LockManager: Send + Sync {
    fn acquire(&self, note_id: &str, user: &UserIdentity);

    /// Refresh the timestamp only; holder fields are left untouched.
    fn renew(&self, note_id: &str);

    fn release(&self, note_id: &str);

    /// The lock on `note_id` if one exists and has not expired.
    fn current(&self, note_id: &str) -> Option<LockRecord>;

    fn is_locked_by_other(&self, note_id: &str, user_id: &str) -> bool {
        self.current(note_id)
            .map_or(false, |lock| lock.user_id != user_id)
    }
}

/// Lock manager over a realtime store without compare-and-swap.
pub struct AdvisoryLockManager {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl AdvisoryLockManager {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            store,
            clock,
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }
}

impl LockManager for AdvisoryLockManager {
    fn acquire(&self, note_id: &str, user: &UserIdentity) {
        let lock_path = path::lock(note_id);
        let record = LockRecord {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            timestamp: self.clock.now_ms(),
        };
        let value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                log::error!("[bandboard.lock] Failed to encode lock for {}: {}", note_id, e);
                return;
            }
        };
        if let Err(e) = self.store.write(&lock_path, value) {
            log::warn!("[bandboard.lock] Acquire of {} failed: {}", note_id, e);
            return;
        }
        if let Err(e) = self.store.on_disconnect(&lock_path, DisconnectAction::Delete) {
            log::warn!(
                "[bandboard.lock] Could not register disconnect cleanup for {}: {}",
                note_id,
                e
            );
        }
    }

    fn renew(&self, note_id: &str) {
        let update = fields([("timestamp", json!(self.clock.now_ms()))]);
        if let Err(e) = self.store.update(&path::lock(note_id), update) {
            log::warn!("[bandboard.lock] Renew of {} failed: {}", note_id, e);
        }
    }

    fn release(&self, note_id: &str) {
        let lock_path = path::lock(note_id);
        if let Err(e) = self.store.delete(&lock_path) {
            log::warn!("[bandboard.lock] Release of {} failed: {}", note_id, e);
        }
        if let Err(e) = self.store.cancel_on_disconnect(&lock_path) {
            log::debug!(
                "[bandboard.lock] Could not cancel disconnect cleanup for {}: {}",
                note_id,
                e
            );
        }
    }

    fn current(&self, note_id: &str) -> Option<LockRecord> {
        match read_typed::<LockRecord>(self.store.as_ref(), &path::lock(note_id)) {
            Ok(Some(lock)) if lock.is_valid(self.clock.now_ms(), self.ttl_ms) => Some(lock),
            Ok(_) => None,
            Err(e) => {
                // Partial or unreadable records count as free.
                log::debug!("[bandboard.lock] Treating lock on {} as free: {}", note_id, e);
                None
            }
        }
    }
}
