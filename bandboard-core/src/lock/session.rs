/// Lock lifetime around one drag or edit gesture.
///
/// begin: refuse if another user holds a valid lock, otherwise acquire and
/// start renewing on a fixed interval. end (or drop): stop renewing, release.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::{LockError, LockManager};
use crate::types::UserIdentity;

pub struct NoteInteraction {
    locks: Arc<dyn LockManager>,
    note_id: String,
    renewal: Option<JoinHandle<()>>,
    ended: bool,
}

impl NoteInteraction {
    /// Start interacting with `note_id`. Renewal only runs when called from
    /// inside a tokio runtime; without one the lock simply ages out.
    pub fn begin(
        locks: Arc<dyn LockManager>,
        note_id: &str,
        user: &UserIdentity,
        renew_every: Duration,
    ) -> Result<Self, LockError> {
        if let Some(holder) = locks.current(note_id) {
            if holder.user_id != user.id {
                return Err(LockError::HeldByOther {
                    note_id: note_id.to_string(),
                    user_name: holder.user_name,
                });
            }
        }

        locks.acquire(note_id, user);

        let renewal = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(renew_loop(
                Arc::clone(&locks),
                note_id.to_string(),
                user.id.clone(),
                renew_every,
            ))),
            Err(_) => {
                log::debug!(
                    "[bandboard.lock] No runtime, lock on {} will not be renewed",
                    note_id
                );
                None
            }
        };

        Ok(Self {
            locks,
            note_id: note_id.to_string(),
            renewal,
            ended: false,
        })
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn is_renewing(&self) -> bool {
        self.renewal.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if let Some(handle) = self.renewal.take() {
            handle.abort();
        }
        self.locks.release(&self.note_id);
    }
}

impl Drop for NoteInteraction {
    fn drop(&mut self) {
        self.finish();
    }
}

async fn renew_loop(
    locks: Arc<dyn LockManager>,
    note_id: String,
    user_id: String,
    every: Duration,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    loop {
        ticker.tick().await;
        if locks.is_locked_by_other(&note_id, &user_id) {
            log::debug!("[bandboard.lock] {} is held by someone else, skipping renewal", note_id);
            continue;
        }
        locks.renew(&note_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lock::AdvisoryLockManager;
    use crate::store::memory::MemoryStore;
    use crate::store::{path, RemoteStore};

    const START: u64 = 50_000_000;
    const EVERY: Duration = Duration::from_secs(60);

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        ann: Arc<AdvisoryLockManager>,
        bob: Arc<AdvisoryLockManager>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(START));
        let ann = Arc::new(AdvisoryLockManager::new(
            Arc::new(store.connect("ann")),
            clock.clone(),
            120_000,
        ));
        let bob = Arc::new(AdvisoryLockManager::new(
            Arc::new(store.connect("bob")),
            clock.clone(),
            120_000,
        ));
        Fixture { store, clock, ann, bob }
    }

    fn ann() -> UserIdentity {
        UserIdentity::new("u-ann", "Ann")
    }

    fn bob() -> UserIdentity {
        UserIdentity::new("u-bob", "Bob")
    }

    #[test]
    fn test_begin_refuses_when_other_holds_lock() {
        let f = fixture();
        f.bob.acquire("n1", &bob());

        let err = NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY)
            .err()
            .unwrap();
        assert!(matches!(err, LockError::HeldByOther { ref user_name, .. } if user_name == "Bob"));
        assert_eq!(f.ann.current("n1").unwrap().user_id, "u-bob");
    }

    #[test]
    fn test_begin_takes_over_expired_lock() {
        let f = fixture();
        f.bob.acquire("n1", &bob());
        f.clock.advance(121_000);

        let interaction = NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY).unwrap();
        assert!(!interaction.is_renewing());
        assert_eq!(f.bob.current("n1").unwrap().user_id, "u-ann");
    }

    #[test]
    fn test_end_releases() {
        let f = fixture();
        let interaction = NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY).unwrap();
        interaction.end();
        assert!(f.bob.current("n1").is_none());
    }

    #[test]
    fn test_drop_releases() {
        let f = fixture();
        {
            let _interaction =
                NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY).unwrap();
            assert!(f.bob.is_locked_by_other("n1", "u-bob"));
        }
        assert!(f.bob.current("n1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_on_interval() {
        let f = fixture();
        let interaction = NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY).unwrap();
        assert!(interaction.is_renewing());

        f.clock.advance(30_000);
        tokio::time::sleep(Duration::from_secs(61)).await;

        let lock = f.bob.current("n1").unwrap();
        assert_eq!(lock.user_id, "u-ann");
        assert_eq!(lock.timestamp, START + 30_000);
        interaction.end();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_renewal_when_taken_over() {
        let f = fixture();
        let interaction = NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY).unwrap();
        f.clock.advance(10_000);
        f.bob.acquire("n1", &bob());

        f.clock.advance(20_000);
        tokio::time::sleep(Duration::from_secs(61)).await;

        let lock = f.ann.current("n1").unwrap();
        assert_eq!(lock.user_id, "u-bob");
        assert_eq!(lock.timestamp, START + 10_000);
        drop(interaction);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_renewal_after_end() {
        let f = fixture();
        let interaction = NoteInteraction::begin(f.ann.clone(), "n1", &ann(), EVERY).unwrap();
        interaction.end();

        tokio::time::sleep(Duration::from_secs(125)).await;
        let observer = f.store.connect("observer");
        assert_eq!(observer.read(&path::lock("n1")).unwrap(), None);
    }
}
