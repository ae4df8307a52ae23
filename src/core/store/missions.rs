use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use super::steps::{STEP_COLUMNS, step_from_row};
use super::types::{MissionRecord, MissionStatus, MissionWithSteps, NewStep, StepCounts};
use super::{OpsStore, StoreResult};

const MISSION_COLUMNS: &str = "id, proposal_id, title, status, created_at, completed_at";

fn mission_from_row(row: &Row<'_>) -> rusqlite::Result<MissionRecord> {
    Ok(MissionRecord {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        completed_at: row.get(5)?,
    })
}

impl OpsStore {
    /// Insert a mission and its steps in one transaction. The mission row is
    /// written first; a second mission for the same proposal violates the
    /// unique constraint and nothing is written.
    pub async fn create_mission_with_steps(
        &self,
        proposal_id: &str,
        title: &str,
        steps: &[NewStep],
    ) -> StoreResult<MissionWithSteps> {
        let mission_id = uuid::Uuid::new_v4().to_string();
        let mut db = self.db.lock().await;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO ops_missions (id, proposal_id, title) VALUES (?1, ?2, ?3)",
            params![mission_id, proposal_id, title],
        )?;
        for step in steps {
            let step_id = uuid::Uuid::new_v4().to_string();
            let input = serde_json::to_string(&step.input)?;
            tx.execute(
                "INSERT INTO ops_steps (id, mission_id, kind, title, input) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![step_id, mission_id, step.kind, step.title, input],
            )?;
        }

        let mission = tx.query_row(
            &format!("SELECT {MISSION_COLUMNS} FROM ops_missions WHERE id = ?1"),
            params![mission_id],
            mission_from_row,
        )?;
        let created = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {STEP_COLUMNS} FROM ops_steps WHERE mission_id = ?1 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(params![mission_id], step_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        };
        tx.commit()?;

        Ok(MissionWithSteps {
            mission,
            steps: created,
        })
    }

    pub async fn get_mission(&self, id: &str) -> StoreResult<Option<MissionRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {MISSION_COLUMNS} FROM ops_missions WHERE id = ?1"),
                params![id],
                mission_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn get_mission_for_proposal(
        &self,
        proposal_id: &str,
    ) -> StoreResult<Option<MissionRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {MISSION_COLUMNS} FROM ops_missions WHERE proposal_id = ?1"),
                params![proposal_id],
                mission_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn list_missions(
        &self,
        status: Option<MissionStatus>,
        limit: usize,
    ) -> StoreResult<Vec<MissionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {MISSION_COLUMNS} FROM ops_missions
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![status, limit as i64], mission_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn count_mission_steps(&self, mission_id: &str) -> StoreResult<StepCounts> {
        let db = self.db.lock().await;
        let counts = db.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'queued'), 0),
                    COALESCE(SUM(status = 'running'), 0),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0)
             FROM ops_steps WHERE mission_id = ?1",
            params![mission_id],
            |row| {
                Ok(StepCounts {
                    total: row.get(0)?,
                    queued: row.get(1)?,
                    running: row.get(2)?,
                    completed: row.get(3)?,
                    failed: row.get(4)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Finalize an active mission. Only the caller whose update actually
    /// flips the row gets `true`.
    pub async fn finish_mission_if_active(
        &self,
        mission_id: &str,
        status: MissionStatus,
    ) -> StoreResult<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE ops_missions SET status = ?1, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?2 AND status = 'active'",
            params![status, mission_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn count_missions_by_status(&self) -> StoreResult<Vec<(String, i64)>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT status, COUNT(*) FROM ops_missions GROUP BY status ORDER BY status",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
