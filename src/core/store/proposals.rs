use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;

use super::types::{ProposalRecord, ProposalStatus};
use super::{OpsStore, StoreResult, json_object_column};

const PROPOSAL_COLUMNS: &str =
    "id, agent_id, kind, title, body, status, policy_snapshot, created_at, decided_at";

fn proposal_from_row(row: &Row<'_>) -> rusqlite::Result<ProposalRecord> {
    Ok(ProposalRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        status: row.get(5)?,
        policy_snapshot: json_object_column(row, 6)?,
        created_at: row.get(7)?,
        decided_at: row.get(8)?,
    })
}

impl OpsStore {
    pub async fn insert_proposal(
        &self,
        agent_id: &str,
        kind: &str,
        title: &str,
        body: Option<&str>,
        status: ProposalStatus,
        policy_snapshot: &Value,
    ) -> StoreResult<ProposalRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let snapshot = serde_json::to_string(policy_snapshot)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ops_proposals (id, agent_id, kind, title, body, status, policy_snapshot, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                     CASE WHEN ?6 = 'pending' THEN NULL ELSE CURRENT_TIMESTAMP END)",
            params![id, agent_id, kind, title, body, status, snapshot],
        )?;
        let rec = db.query_row(
            &format!("SELECT {PROPOSAL_COLUMNS} FROM ops_proposals WHERE id = ?1"),
            params![id],
            proposal_from_row,
        )?;
        Ok(rec)
    }

    pub async fn get_proposal(&self, id: &str) -> StoreResult<Option<ProposalRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {PROPOSAL_COLUMNS} FROM ops_proposals WHERE id = ?1"),
                params![id],
                proposal_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
        limit: usize,
    ) -> StoreResult<Vec<ProposalRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM ops_proposals
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![status, limit as i64], proposal_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Proposals an agent has filed since the start of the current UTC day.
    pub async fn count_proposals_today_by_agent(&self, agent_id: &str) -> StoreResult<i64> {
        let db = self.db.lock().await;
        let count = db.query_row(
            "SELECT COUNT(*) FROM ops_proposals
             WHERE agent_id = ?1 AND created_at >= datetime('now', 'start of day')",
            params![agent_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Proposals of a kind filed since the start of the current UTC day.
    pub async fn count_proposals_today_by_kind(&self, kind: &str) -> StoreResult<i64> {
        let db = self.db.lock().await;
        let count = db.query_row(
            "SELECT COUNT(*) FROM ops_proposals
             WHERE kind = ?1 AND created_at >= datetime('now', 'start of day')",
            params![kind],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Move a pending proposal to a decided status. Returns `false` when the
    /// proposal was no longer pending, so concurrent deciders cannot both win.
    pub async fn decide_proposal(&self, id: &str, status: ProposalStatus) -> StoreResult<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE ops_proposals SET status = ?1, decided_at = CURRENT_TIMESTAMP
             WHERE id = ?2 AND status = 'pending'",
            params![status, id],
        )?;
        Ok(rows > 0)
    }

    pub async fn count_proposals_by_status(&self) -> StoreResult<Vec<(String, i64)>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT status, COUNT(*) FROM ops_proposals GROUP BY status ORDER BY status",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) async fn backdate_proposal(&self, id: &str, days: i64) -> StoreResult<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE ops_proposals SET created_at = datetime('now', ?1) WHERE id = ?2",
            params![format!("-{days} days"), id],
        )?;
        Ok(())
    }
}
