use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use serde_json::{Value, json};

use super::types::{StepRecord, StepStatus};
use super::{OpsStore, StoreResult, json_column, json_object_column};

pub(super) const STEP_COLUMNS: &str = "id, mission_id, kind, title, input, output, status, \
     worker_id, claimed_at, completed_at, created_at";

pub(super) fn step_from_row(row: &Row<'_>) -> rusqlite::Result<StepRecord> {
    Ok(StepRecord {
        id: row.get(0)?,
        mission_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        input: json_object_column(row, 4)?,
        output: json_column(row, 5)?,
        status: row.get(6)?,
        worker_id: row.get(7)?,
        claimed_at: row.get(8)?,
        completed_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl OpsStore {
    /// Atomically claim the oldest queued step of `kind` for `worker_id`.
    ///
    /// Selection and the status flip happen in a single UPDATE statement, and
    /// the outer `status = 'queued'` guard makes a lost race a no-op. Writers
    /// on the same database file are serialized by SQLite, so two workers can
    /// never both observe the same row as queued.
    pub async fn claim_next_step(
        &self,
        kind: &str,
        worker_id: &str,
    ) -> StoreResult<Option<StepRecord>> {
        let db = self.db.lock().await;
        let step = db
            .query_row(
                &format!(
                    "UPDATE ops_steps
                     SET status = 'running', worker_id = ?1, claimed_at = CURRENT_TIMESTAMP
                     WHERE id = (
                         SELECT id FROM ops_steps
                         WHERE status = 'queued' AND kind = ?2
                         ORDER BY created_at ASC, rowid ASC
                         LIMIT 1
                     ) AND status = 'queued'
                     RETURNING {STEP_COLUMNS}"
                ),
                params![worker_id, kind],
                step_from_row,
            )
            .optional()?;
        Ok(step)
    }

    #[cfg(test)]
    pub async fn get_step(&self, id: &str) -> StoreResult<Option<StepRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {STEP_COLUMNS} FROM ops_steps WHERE id = ?1"),
                params![id],
                step_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn list_mission_steps(&self, mission_id: &str) -> StoreResult<Vec<StepRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {STEP_COLUMNS} FROM ops_steps WHERE mission_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = stmt.query_map(params![mission_id], step_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Record the terminal outcome of a step. The write only lands while the
    /// step is still running under the same worker; a step that was recovered
    /// in the meantime is left untouched and `false` is returned.
    pub async fn finish_step(
        &self,
        step_id: &str,
        worker_id: &str,
        status: StepStatus,
        output: &Value,
    ) -> StoreResult<bool> {
        let output = serde_json::to_string(output)?;
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE ops_steps SET status = ?1, output = ?2, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?3 AND status = 'running' AND worker_id = ?4",
            params![status, output, step_id, worker_id],
        )?;
        Ok(rows > 0)
    }

    /// Running steps claimed more than `timeout_min` minutes ago.
    pub async fn list_stale_steps(&self, timeout_min: i64) -> StoreResult<Vec<StepRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {STEP_COLUMNS} FROM ops_steps
             WHERE status = 'running' AND claimed_at IS NOT NULL
               AND claimed_at < datetime('now', ?1)
             ORDER BY claimed_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![format!("-{timeout_min} minutes")], step_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fail a stale running step and queue a fresh copy of it with the same
    /// mission, kind, title and input. Returns the replacement, or `None` if
    /// the step had already left `running`.
    pub async fn requeue_stale_step(
        &self,
        step_id: &str,
        timeout_min: i64,
    ) -> StoreResult<Option<StepRecord>> {
        let replacement_id = uuid::Uuid::new_v4().to_string();
        let failure = serde_json::to_string(&json!({
            "error": format!("step exceeded the {timeout_min} minute running timeout"),
            "replaced_by": replacement_id,
        }))?;

        let mut db = self.db.lock().await;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = tx.execute(
            "UPDATE ops_steps SET status = 'failed', output = ?1, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?2 AND status = 'running'",
            params![failure, step_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO ops_steps (id, mission_id, kind, title, input)
             SELECT ?1, mission_id, kind, title, input FROM ops_steps WHERE id = ?2",
            params![replacement_id, step_id],
        )?;
        let replacement = tx.query_row(
            &format!("SELECT {STEP_COLUMNS} FROM ops_steps WHERE id = ?1"),
            params![replacement_id],
            step_from_row,
        )?;
        tx.commit()?;
        Ok(Some(replacement))
    }

    pub async fn count_steps_by_status(&self) -> StoreResult<Vec<(String, i64)>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT status, COUNT(*) FROM ops_steps GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) async fn backdate_step_claim(&self, step_id: &str, minutes: i64) -> StoreResult<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE ops_steps SET claimed_at = datetime('now', ?1) WHERE id = ?2",
            params![format!("-{minutes} minutes"), step_id],
        )?;
        Ok(())
    }
}
