//! The shared presence store boundary.
//!
//! Implementations own their own IO and timeout behavior; the engine applies
//! none of its own. Rows are upserted under the composite identity key and
//! never deleted: closed tabs simply age into `Stale` and remain as
//! last-known history.

use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tabpulse_protocol::PresenceRecord;

mod sqlite;

pub use sqlite::SqliteStore;

/// Durable key-value store reachable for upsert and query, keyed by
/// `(user_id, device_id, tab_id)`. Conflict resolution is last-writer-wins
/// on the composite key.
pub trait PresenceStore: Send + Sync {
    fn upsert(&self, record: &PresenceRecord) -> Result<(), String>;

    /// Every record owned by `user_id`, across all devices and tabs.
    fn fetch_for_user(&self, user_id: &str) -> Result<Vec<PresenceRecord>, String>;
}

struct MemoryRow {
    record: PresenceRecord,
    created_at: String,
}

/// In-memory store for tests and single-process use.
///
/// Rows keep their first-insert order, which is the order queries return.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<MemoryRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-insert timestamp for a row, if it exists.
    pub fn created_at(&self, user_id: &str, device_id: &str, tab_id: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|row| row.record.key() == (user_id, device_id, tab_id))
            .map(|row| row.created_at.clone())
    }
}

impl PresenceStore for MemoryStore {
    fn upsert(&self, record: &PresenceRecord) -> Result<(), String> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        match rows.iter_mut().find(|row| row.record.key() == record.key()) {
            Some(row) => row.record = record.clone(),
            None => rows.push(MemoryRow {
                record: record.clone(),
                created_at: Utc::now().to_rfc3339(),
            }),
        }
        Ok(())
    }

    fn fetch_for_user(&self, user_id: &str) -> Result<Vec<PresenceRecord>, String> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|row| row.record.user_id == user_id)
            .map(|row| row.record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabpulse_protocol::PresenceState;

    fn record(user: &str, device: &str, tab: &str) -> PresenceRecord {
        PresenceRecord {
            user_id: user.to_string(),
            device_id: device.to_string(),
            tab_id: tab.to_string(),
            user_agent: "test/1.0".to_string(),
            is_active: true,
            last_seen: "2026-03-01T12:00:00Z".to_string(),
            state: PresenceState::Active,
        }
    }

    #[test]
    fn upsert_replaces_in_place_and_keeps_order() {
        let store = MemoryStore::new();
        store.upsert(&record("u", "d1", "t1")).expect("upsert");
        store.upsert(&record("u", "d2", "t2")).expect("upsert");

        let mut updated = record("u", "d1", "t1");
        updated.state = PresenceState::Idle;
        store.upsert(&updated).expect("upsert");

        let rows = store.fetch_for_user("u").expect("fetch");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tab_id, "t1");
        assert_eq!(rows[0].state, PresenceState::Idle);
        assert_eq!(rows[1].tab_id, "t2");
    }

    #[test]
    fn fetch_filters_by_user() {
        let store = MemoryStore::new();
        store.upsert(&record("alice", "d1", "t1")).expect("upsert");
        store.upsert(&record("bob", "d1", "t1")).expect("upsert");

        let rows = store.fetch_for_user("alice").expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "alice");
    }

    #[test]
    fn created_at_survives_re_upsert() {
        let store = MemoryStore::new();
        store.upsert(&record("u", "d1", "t1")).expect("upsert");
        let created = store.created_at("u", "d1", "t1").expect("created_at");

        let mut updated = record("u", "d1", "t1");
        updated.last_seen = "2026-03-01T12:05:00Z".to_string();
        store.upsert(&updated).expect("upsert");

        assert_eq!(store.created_at("u", "d1", "t1"), Some(created));
    }
}
