use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use herald_core::error::{HeraldError, Result};
use herald_core::types::CampaignStatus;

use crate::snapshot::Snapshot;

/// Where campaign snapshots live between runs.
///
/// Keeps the latest snapshot per campaign and a ledger of consumed
/// suspension tokens, so a snapshot can be resumed at most once.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot for `campaign_id`.
    fn save(&self, campaign_id: &str, snapshot: &Snapshot, status: CampaignStatus) -> Result<()>;

    fn load_latest(&self, campaign_id: &str) -> Result<Option<Snapshot>>;

    /// Mark a suspension token as used. Returns false if it already was.
    fn consume(&self, campaign_id: &str, token: &str) -> Result<bool>;

    fn is_consumed(&self, token: &str) -> Result<bool>;
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> HeraldError {
    HeraldError::Database(e.to_string())
}

/// In-process store for tests and one-shot runs.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Snapshot>>,
    consumed: Mutex<HashSet<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, campaign_id: &str, snapshot: &Snapshot, _status: CampaignStatus) -> Result<()> {
        self.snapshots
            .lock()
            .map_err(lock_err)?
            .insert(campaign_id.to_string(), snapshot.clone());
        Ok(())
    }

    fn load_latest(&self, campaign_id: &str) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.lock().map_err(lock_err)?.get(campaign_id).cloned())
    }

    fn consume(&self, _campaign_id: &str, token: &str) -> Result<bool> {
        Ok(self.consumed.lock().map_err(lock_err)?.insert(token.to_string()))
    }

    fn is_consumed(&self, token: &str) -> Result<bool> {
        Ok(self.consumed.lock().map_err(lock_err)?.contains(token))
    }
}

/// Persistent snapshot store backed by SQLite.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Open or create the snapshot database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| HeraldError::Database(format!("Failed to open snapshot store: {}", e)))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| HeraldError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS snapshots (
                 campaign_id TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 snapshot TEXT NOT NULL,
                 saved_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS consumed_tokens (
                 token TEXT PRIMARY KEY,
                 campaign_id TEXT NOT NULL,
                 consumed_at TEXT NOT NULL
             );",
        )
        .map_err(|e| HeraldError::Database(format!("Failed to initialize snapshot schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Campaign ids with their last saved status, newest first.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn
            .prepare("SELECT campaign_id, status FROM snapshots ORDER BY saved_at DESC")
            .map_err(|e| HeraldError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| HeraldError::Database(e.to_string()))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HeraldError::Database(e.to_string()))
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&self, campaign_id: &str, snapshot: &Snapshot, status: CampaignStatus) -> Result<()> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute(
            "INSERT INTO snapshots (campaign_id, status, snapshot, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(campaign_id) DO UPDATE SET
                 status = excluded.status,
                 snapshot = excluded.snapshot,
                 saved_at = excluded.saved_at",
            params![
                campaign_id,
                status.as_str(),
                snapshot.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| HeraldError::Database(format!("Failed to save snapshot: {}", e)))?;
        Ok(())
    }

    fn load_latest(&self, campaign_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM snapshots WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HeraldError::Database(format!("Failed to load snapshot: {}", e)))?;
        Ok(raw.map(Snapshot::from_string))
    }

    fn consume(&self, campaign_id: &str, token: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO consumed_tokens (token, campaign_id, consumed_at)
                 VALUES (?1, ?2, ?3)",
                params![token, campaign_id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| HeraldError::Database(format!("Failed to record token: {}", e)))?;
        Ok(inserted == 1)
    }

    fn is_consumed(&self, token: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM consumed_tokens WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HeraldError::Database(e.to_string()))?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::campaign::Campaign;

    fn snapshot(goal: &str) -> (String, Snapshot) {
        let c = Campaign::new(goal).unwrap();
        (c.id.clone(), Snapshot::capture(&c).unwrap())
    }

    fn exercise(store: &dyn SnapshotStore) {
        let (id, first) = snapshot("Launch");
        assert!(store.load_latest(&id).unwrap().is_none());

        store.save(&id, &first, CampaignStatus::Planning).unwrap();
        assert_eq!(store.load_latest(&id).unwrap(), Some(first));

        let (_, second) = snapshot("Relaunch");
        store.save(&id, &second, CampaignStatus::AwaitingFeedback).unwrap();
        assert_eq!(store.load_latest(&id).unwrap(), Some(second));

        assert!(!store.is_consumed("tok-1").unwrap());
        assert!(store.consume(&id, "tok-1").unwrap());
        assert!(!store.consume(&id, "tok-1").unwrap());
        assert!(store.is_consumed("tok-1").unwrap());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySnapshotStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        exercise(&SqliteSnapshotStore::in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("campaigns.db");
        let (id, snap) = snapshot("Launch");
        {
            let store = SqliteSnapshotStore::open(&path).unwrap();
            store.save(&id, &snap, CampaignStatus::AwaitingFeedback).unwrap();
            store.consume(&id, "tok-9").unwrap();
        }
        let store = SqliteSnapshotStore::open(&path).unwrap();
        assert_eq!(store.load_latest(&id).unwrap(), Some(snap));
        assert!(store.is_consumed("tok-9").unwrap());
        let listed = store.list().unwrap();
        assert_eq!(listed, vec![(id, "awaiting_feedback".to_string())]);
    }
}
