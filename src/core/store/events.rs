use rusqlite::{Row, params};
use serde_json::Value;

use super::types::EventRecord;
use super::{OpsStore, StoreResult, json_column};

const EVENT_COLUMNS: &str = "id, kind, source, payload, created_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        source: row.get(2)?,
        payload: json_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

impl OpsStore {
    pub async fn add_event(
        &self,
        kind: &str,
        source: Option<&str>,
        payload: Option<&Value>,
    ) -> StoreResult<EventRecord> {
        let payload = payload.map(serde_json::to_string).transpose()?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ops_events (kind, source, payload) VALUES (?1, ?2, ?3)",
            params![kind, source, payload],
        )?;
        let id = db.last_insert_rowid();
        let rec = db.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM ops_events WHERE id = ?1"),
            params![id],
            event_from_row,
        )?;
        Ok(rec)
    }

    /// Newest first, optionally restricted to one event kind.
    pub async fn list_events(
        &self,
        kind: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<EventRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM ops_events
             WHERE (?1 IS NULL OR kind = ?1)
             ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![kind, limit as i64], event_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
