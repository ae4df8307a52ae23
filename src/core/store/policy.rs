use rusqlite::{OptionalExtension, params};
use serde_json::{Map, Value};

use super::types::PolicyRecord;
use super::{OpsStore, StoreResult};

impl OpsStore {
    pub async fn get_policy(&self, key: &str) -> StoreResult<Option<Value>> {
        let db = self.db.lock().await;
        let raw: Option<String> = db
            .query_row(
                "SELECT value FROM ops_policy WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|text| serde_json::from_str(&text)).transpose()?)
    }

    pub async fn set_policy(&self, key: &str, value: &Value) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ops_policy (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![key, json],
        )?;
        Ok(())
    }

    /// Insert only if the key is absent. Returns whether a row was written.
    pub async fn seed_policy(&self, key: &str, value: &Value) -> StoreResult<bool> {
        let json = serde_json::to_string(value)?;
        let db = self.db.lock().await;
        let rows = db.execute(
            "INSERT OR IGNORE INTO ops_policy (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(rows > 0)
    }

    pub async fn delete_policy(&self, key: &str) -> StoreResult<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM ops_policy WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    pub async fn list_policy(&self) -> StoreResult<Vec<PolicyRecord>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT key, value, updated_at FROM ops_policy ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (key, value, updated_at) = row?;
            out.push(PolicyRecord {
                key,
                value: serde_json::from_str(&value)?,
                updated_at,
            });
        }
        Ok(out)
    }

    /// Every policy row folded into a single `{key: value}` object.
    pub async fn policy_snapshot(&self) -> StoreResult<Value> {
        let mut map = Map::new();
        for rec in self.list_policy().await? {
            map.insert(rec.key, rec.value);
        }
        Ok(Value::Object(map))
    }
}
