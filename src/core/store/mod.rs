mod action_runs;
mod agent_config;
mod events;
mod missions;
mod policy;
mod proposals;
mod steps;
pub mod types;

use rusqlite::{Connection, ErrorCode, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database is locked, busy or cannot be opened. Callers treat this
    /// as a transient outage.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("invalid json column: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
            ) {
                return StoreError::Unavailable(err.to_string());
            }
        }
        StoreError::Sqlite(err)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shared handle to the ops database. Cloning is cheap; every clone talks to
/// the same connection. Separate processes open their own connection to the
/// same file and rely on SQLite locking for cross-process coordination.
#[derive(Clone)]
pub struct OpsStore {
    db: Arc<Mutex<Connection>>,
}

impl OpsStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
                NativePlatform::restrict_dir_permissions(parent);
            }
        }

        let conn = Connection::open(&path)?;
        NativePlatform::restrict_file_permissions(&path);
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::init(&conn)?;

        info!("Ops store opened at {} (journal_mode={})", path.display(), mode);
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub async fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Raw SQL against the shared connection, for installing failure triggers.
    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.db.lock().await.execute_batch(sql)?;
        Ok(())
    }

    fn init(db: &Connection) -> StoreResult<()> {
        db.busy_timeout(BUSY_TIMEOUT)?;
        db.execute_batch("PRAGMA foreign_keys = ON;")?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_proposals (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'approved', 'rejected')),
                policy_snapshot TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                decided_at DATETIME
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_ops_proposals_agent_created
             ON ops_proposals(agent_id, created_at)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_ops_proposals_kind_created
             ON ops_proposals(kind, created_at)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_missions (
                id TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL UNIQUE REFERENCES ops_proposals(id),
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'completed', 'failed')),
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_steps (
                id TEXT PRIMARY KEY,
                mission_id TEXT NOT NULL REFERENCES ops_missions(id),
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                input TEXT NOT NULL DEFAULT '{}',
                output TEXT,
                status TEXT NOT NULL DEFAULT 'queued'
                    CHECK (status IN ('queued', 'running', 'completed', 'failed')),
                worker_id TEXT,
                claimed_at DATETIME,
                completed_at DATETIME,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_ops_steps_claim
             ON ops_steps(status, kind, created_at)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_ops_steps_mission ON ops_steps(mission_id)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_ops_steps_stale ON ops_steps(status, claimed_at)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                source TEXT,
                payload TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_ops_events_kind ON ops_events(kind, id)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_policy (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_action_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('ok', 'error')),
                details TEXT NOT NULL DEFAULT '{}',
                duration_ms INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS ops_agent_config (
                agent_id TEXT PRIMARY KEY,
                model_override TEXT,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }

    /// Cheap availability probe used by the health endpoint and CLI status.
    pub async fn ping(&self) -> bool {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

/// Decode an optional JSON text column.
pub(crate) fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        serde_json::from_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Same as [`json_column`] but NULL decodes to an empty object.
pub(crate) fn json_object_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    Ok(json_column(row, idx)?.unwrap_or_else(|| Value::Object(Default::default())))
}
