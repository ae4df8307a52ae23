use rusqlite::{Row, params};
use serde_json::Value;

use super::types::{ActionRunRecord, ActionRunStatus};
use super::{OpsStore, StoreResult, json_object_column};

const ACTION_RUN_COLUMNS: &str = "id, action, status, details, duration_ms, created_at";

fn action_run_from_row(row: &Row<'_>) -> rusqlite::Result<ActionRunRecord> {
    Ok(ActionRunRecord {
        id: row.get(0)?,
        action: row.get(1)?,
        status: row.get(2)?,
        details: json_object_column(row, 3)?,
        duration_ms: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl OpsStore {
    pub async fn add_action_run(
        &self,
        action: &str,
        status: ActionRunStatus,
        details: &Value,
        duration_ms: i64,
    ) -> StoreResult<ActionRunRecord> {
        let details = serde_json::to_string(details)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ops_action_runs (action, status, details, duration_ms) VALUES (?1, ?2, ?3, ?4)",
            params![action, status, details, duration_ms],
        )?;
        let id = db.last_insert_rowid();
        let rec = db.query_row(
            &format!("SELECT {ACTION_RUN_COLUMNS} FROM ops_action_runs WHERE id = ?1"),
            params![id],
            action_run_from_row,
        )?;
        Ok(rec)
    }

    pub async fn list_action_runs(&self, limit: usize) -> StoreResult<Vec<ActionRunRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {ACTION_RUN_COLUMNS} FROM ops_action_runs ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], action_run_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
