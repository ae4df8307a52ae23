use rusqlite::{OptionalExtension, params};

use super::types::AgentConfigRecord;
use super::{OpsStore, StoreResult};

impl OpsStore {
    /// Per-agent model override, if one is set.
    pub async fn get_agent_model(&self, agent_id: &str) -> StoreResult<Option<String>> {
        let db = self.db.lock().await;
        let model: Option<Option<String>> = db
            .query_row(
                "SELECT model_override FROM ops_agent_config WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(model.flatten().filter(|m| !m.trim().is_empty()))
    }

    pub async fn set_agent_model(&self, agent_id: &str, model: &str) -> StoreResult<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ops_agent_config (agent_id, model_override, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(agent_id) DO UPDATE SET
                model_override = excluded.model_override, updated_at = CURRENT_TIMESTAMP",
            params![agent_id, model],
        )?;
        Ok(())
    }

    pub async fn clear_agent_model(&self, agent_id: &str) -> StoreResult<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "DELETE FROM ops_agent_config WHERE agent_id = ?1",
            params![agent_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn list_agent_models(&self) -> StoreResult<Vec<AgentConfigRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT agent_id, model_override, updated_at FROM ops_agent_config ORDER BY agent_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AgentConfigRecord {
                agent_id: row.get(0)?,
                model_override: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
