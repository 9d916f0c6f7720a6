//! SQLite-backed shared presence store.
//!
//! One table keyed by the identity triple. Upserts overwrite everything
//! except `created_at`, which is set on first insert and preserved on
//! conflict. This is the durable store tabs on different devices converge
//! on; any process with access to the file sees the same rows.

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::PathBuf;
use tabpulse_protocol::{PresenceRecord, PresenceState};

use super::PresenceStore;

const DATA_DIR: &str = ".tabpulse";
const DB_FILE: &str = "presence.db";

pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let store = Self { path };
        store.init_schema()?;
        Ok(store)
    }

    /// The default on-disk location, `~/.tabpulse/presence.db`.
    pub fn default_path() -> Result<PathBuf, String> {
        let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
        Ok(home.join(DATA_DIR).join(DB_FILE))
    }

    /// First-insert timestamp for a row, if it exists.
    pub fn created_at(
        &self,
        user_id: &str,
        device_id: &str,
        tab_id: &str,
    ) -> Result<Option<String>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT created_at FROM presence \
                 WHERE user_id = ?1 AND device_id = ?2 AND tab_id = ?3",
                params![user_id, device_id, tab_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| format!("Failed to query created_at: {}", err))
        })
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS presence (
                    user_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    tab_id TEXT NOT NULL,
                    user_agent TEXT NOT NULL,
                    is_active INTEGER NOT NULL,
                    state TEXT NOT NULL,
                    last_seen TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, device_id, tab_id)
                 );
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize presence schema: {}", err))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create presence data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}

impl PresenceStore for SqliteStore {
    fn upsert(&self, record: &PresenceRecord) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO presence \
                    (user_id, device_id, tab_id, user_agent, is_active, state, last_seen, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(user_id, device_id, tab_id) DO UPDATE SET \
                    user_agent = excluded.user_agent, \
                    is_active = excluded.is_active, \
                    state = excluded.state, \
                    last_seen = excluded.last_seen",
                params![
                    record.user_id,
                    record.device_id,
                    record.tab_id,
                    record.user_agent,
                    record.is_active,
                    record.state.as_str(),
                    record.last_seen,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|err| format!("Failed to upsert presence row: {}", err))?;
            Ok(())
        })
    }

    fn fetch_for_user(&self, user_id: &str) -> Result<Vec<PresenceRecord>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, device_id, tab_id, user_agent, is_active, state, last_seen \
                     FROM presence WHERE user_id = ?1 \
                     ORDER BY created_at ASC, device_id ASC, tab_id ASC",
                )
                .map_err(|err| format!("Failed to prepare presence query: {}", err))?;

            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })
                .map_err(|err| format!("Failed to read presence rows: {}", err))?;

            let mut records = Vec::new();
            for row in rows {
                let (user_id, device_id, tab_id, user_agent, is_active, state, last_seen) =
                    row.map_err(|err| format!("Failed to decode presence row: {}", err))?;
                let state = PresenceState::from_str(&state)
                    .ok_or_else(|| format!("Unknown presence state in store: {}", state))?;
                records.push(PresenceRecord {
                    user_id,
                    device_id,
                    tab_id,
                    user_agent,
                    is_active,
                    last_seen,
                    state,
                });
            }

            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, device: &str, tab: &str, state: PresenceState) -> PresenceRecord {
        PresenceRecord {
            user_id: user.to_string(),
            device_id: device.to_string(),
            tab_id: tab.to_string(),
            user_agent: "test/1.0".to_string(),
            is_active: state == PresenceState::Active,
            last_seen: "2026-03-01T12:00:00Z".to_string(),
            state,
        }
    }

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = SqliteStore::new(temp_dir.path().join("presence.db")).expect("store init");
        (temp_dir, store)
    }

    #[test]
    fn upsert_then_fetch_round_trips() {
        let (_guard, store) = open_store();
        let row = record("u", "d1", "t1", PresenceState::Active);
        store.upsert(&row).expect("upsert");

        let rows = store.fetch_for_user("u").expect("fetch");
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn conflict_overwrites_with_latest() {
        let (_guard, store) = open_store();
        store
            .upsert(&record("u", "d1", "t1", PresenceState::Active))
            .expect("upsert");

        let mut updated = record("u", "d1", "t1", PresenceState::Idle);
        updated.last_seen = "2026-03-01T12:05:00Z".to_string();
        store.upsert(&updated).expect("upsert");

        let rows = store.fetch_for_user("u").expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, PresenceState::Idle);
        assert_eq!(rows[0].last_seen, "2026-03-01T12:05:00Z");
    }

    #[test]
    fn created_at_is_preserved_on_conflict() {
        let (_guard, store) = open_store();
        store
            .upsert(&record("u", "d1", "t1", PresenceState::Active))
            .expect("upsert");
        let created = store
            .created_at("u", "d1", "t1")
            .expect("query")
            .expect("row exists");

        store
            .upsert(&record("u", "d1", "t1", PresenceState::Stale))
            .expect("upsert");
        assert_eq!(
            store.created_at("u", "d1", "t1").expect("query"),
            Some(created)
        );
    }

    #[test]
    fn fetch_is_scoped_to_the_user() {
        let (_guard, store) = open_store();
        store
            .upsert(&record("alice", "d1", "t1", PresenceState::Active))
            .expect("upsert");
        store
            .upsert(&record("bob", "d2", "t2", PresenceState::Active))
            .expect("upsert");

        let rows = store.fetch_for_user("alice").expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "alice");
    }

    #[test]
    fn rows_are_never_deleted_only_overwritten() {
        let (_guard, store) = open_store();
        store
            .upsert(&record("u", "d1", "t1", PresenceState::Active))
            .expect("upsert");
        store
            .upsert(&record("u", "d1", "t1", PresenceState::Stale))
            .expect("upsert");

        let rows = store.fetch_for_user("u").expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, PresenceState::Stale);
    }
}
