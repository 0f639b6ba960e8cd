/// Online indicators at `presence/{userId}`.
///
/// Going online registers a disconnect hook that flips `online` back to false,
/// so a crashed client still shows up as offline once its socket drops.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::clock::Clock;
use crate::store::{fields, path, write_typed, DisconnectAction, RemoteStore};
use crate::types::{PresenceRecord, UserIdentity};

pub struct PresenceTracker {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn go_online(&self, user: &UserIdentity) {
        let target = path::presence_user(&user.id);
        let record = PresenceRecord {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            photo_url: user.photo_url.clone(),
            online: true,
            last_active: self.clock.now_ms(),
        };
        if let Err(e) = write_typed(self.store.as_ref(), &target, &record) {
            log::warn!("[bandboard.presence] Failed to mark {} online: {}", user.id, e);
            return;
        }
        let offline = DisconnectAction::Update(fields([("online", json!(false))]));
        if let Err(e) = self.store.on_disconnect(&target, offline) {
            log::warn!("[bandboard.presence] Failed to register disconnect hook for {}: {}", user.id, e);
        }
    }

    pub fn heartbeat(&self, user_id: &str) {
        let target = path::presence_user(user_id);
        let update = fields([("lastActive", json!(self.clock.now_ms()))]);
        if let Err(e) = self.store.update(&target, update) {
            log::debug!("[bandboard.presence] Heartbeat for {} failed: {}", user_id, e);
        }
    }

    pub fn go_offline(&self, user_id: &str) {
        let target = path::presence_user(user_id);
        let update = fields([
            ("online", json!(false)),
            ("lastActive", json!(self.clock.now_ms())),
        ]);
        if let Err(e) = self.store.update(&target, update) {
            log::warn!("[bandboard.presence] Failed to mark {} offline: {}", user_id, e);
        }
        if let Err(e) = self.store.cancel_on_disconnect(&target) {
            log::debug!("[bandboard.presence] Failed to cancel disconnect hook for {}: {}", user_id, e);
        }
    }
}

/// Online users, sorted by display name.
pub fn online_users(records: &BTreeMap<String, PresenceRecord>) -> Vec<&PresenceRecord> {
    let mut online: Vec<&PresenceRecord> = records.values().filter(|r| r.online).collect();
    online.sort_by(|a, b| a.user_name.cmp(&b.user_name).then_with(|| a.user_id.cmp(&b.user_id)));
    online
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::{MemoryConnection, MemoryStore};
    use crate::store::read_typed;

    fn record(conn: &MemoryConnection, user_id: &str) -> Option<PresenceRecord> {
        read_typed(conn, &path::presence_user(user_id)).unwrap()
    }

    #[test]
    fn test_online_heartbeat_offline() {
        let store = MemoryStore::new();
        let conn = store.connect("c1");
        let clock = Arc::new(ManualClock::new(1_000));
        let presence = PresenceTracker::new(Arc::new(conn.clone()), clock.clone());
        let mut user = UserIdentity::new("u1", "Ann");
        user.photo_url = Some("https://example.com/ann.png".into());

        presence.go_online(&user);
        let online = record(&conn, "u1").unwrap();
        assert!(online.online);
        assert_eq!(online.photo_url.as_deref(), Some("https://example.com/ann.png"));

        clock.advance(30_000);
        presence.heartbeat("u1");
        assert_eq!(record(&conn, "u1").unwrap().last_active, 31_000);

        presence.go_offline("u1");
        let offline = record(&conn, "u1").unwrap();
        assert!(!offline.online);
        assert_eq!(conn.disconnect(), 0);
    }

    #[test]
    fn test_disconnect_marks_offline() {
        let store = MemoryStore::new();
        let conn = store.connect("c1");
        let observer = store.connect("c2");
        let presence = PresenceTracker::new(Arc::new(conn.clone()), Arc::new(ManualClock::new(5)));

        presence.go_online(&UserIdentity::new("u1", "Ann"));
        assert_eq!(conn.disconnect(), 1);

        let record = record(&observer, "u1").unwrap();
        assert!(!record.online);
        assert_eq!(record.user_name, "Ann");
    }

    #[test]
    fn test_online_users_filters_and_sorts() {
        let mut records = BTreeMap::new();
        for (id, name, online) in [("u1", "Zoe", true), ("u2", "Ann", true), ("u3", "Bob", false)] {
            records.insert(
                id.to_string(),
                PresenceRecord {
                    user_id: id.to_string(),
                    user_name: name.to_string(),
                    photo_url: None,
                    online,
                    last_active: 0,
                },
            );
        }
        let names: Vec<&str> = online_users(&records).iter().map(|r| r.user_name.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Zoe"]);
    }
}
