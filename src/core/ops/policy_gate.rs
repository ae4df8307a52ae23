use serde_json::{Value, json};
use tracing::info;

use crate::core::store::{OpsStore, StoreResult};

pub const AUTO_APPROVE: &str = "auto_approve";
pub const DAILY_PROPOSAL_CAP: &str = "daily_proposal_cap";
pub const STALE_STEP_TIMEOUT_MIN: &str = "stale_step_timeout_min";

const DEFAULT_DAILY_MAX: i64 = 50;
const DEFAULT_KIND_MAX_PER_DAY: i64 = 999;
const DEFAULT_STALE_TIMEOUT_MIN: i64 = 30;

/// Result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Admission rules evaluated against current counts and the policy table.
///
/// Counts are read without holding any lock across the decision, so a burst
/// of concurrent proposals from one agent may overshoot a cap by the number
/// in flight.
#[derive(Clone)]
pub struct PolicyGate {
    store: OpsStore,
}

impl PolicyGate {
    pub fn new(store: OpsStore) -> Self {
        Self { store }
    }

    pub async fn check_daily_cap(&self, agent_id: &str) -> StoreResult<GateDecision> {
        let policy = self.store.get_policy(DAILY_PROPOSAL_CAP).await?;
        let max = policy
            .as_ref()
            .and_then(|p| int_field(p, "max"))
            .unwrap_or(DEFAULT_DAILY_MAX);
        let count = self.store.count_proposals_today_by_agent(agent_id).await?;
        if count >= max {
            return Ok(GateDecision::deny(format!("Daily cap reached: {count}/{max}")));
        }
        Ok(GateDecision::allow())
    }

    /// Only enforced when a `{kind}_cap` policy row exists.
    pub async fn check_kind_cap(&self, kind: &str) -> StoreResult<GateDecision> {
        let Some(policy) = self.store.get_policy(&kind_cap_key(kind)).await? else {
            return Ok(GateDecision::allow());
        };
        let max = int_field(&policy, "max_per_day").unwrap_or(DEFAULT_KIND_MAX_PER_DAY);
        let count = self.store.count_proposals_today_by_kind(kind).await?;
        if count >= max {
            return Ok(GateDecision::deny(format!(
                "Kind cap '{kind}': {count}/{max}"
            )));
        }
        Ok(GateDecision::allow())
    }

    pub async fn should_auto_approve(&self, kind: &str) -> StoreResult<bool> {
        let Some(policy) = self.store.get_policy(AUTO_APPROVE).await? else {
            return Ok(false);
        };
        let enabled = policy
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !enabled {
            return Ok(false);
        }
        let listed = policy
            .get("kinds")
            .and_then(Value::as_array)
            .map(|kinds| kinds.iter().any(|k| k.as_str() == Some(kind)))
            .unwrap_or(false);
        Ok(listed)
    }

    /// Minutes a step may stay running before the heartbeat recovers it.
    /// Accepts `{"value": N}` or a bare number.
    pub async fn stale_step_timeout_min(&self) -> StoreResult<i64> {
        let policy = self.store.get_policy(STALE_STEP_TIMEOUT_MIN).await?;
        let minutes = policy
            .as_ref()
            .and_then(|p| as_int(p).or_else(|| int_field(p, "value")))
            .unwrap_or(DEFAULT_STALE_TIMEOUT_MIN);
        Ok(minutes.max(0))
    }
}

pub fn kind_cap_key(kind: &str) -> String {
    format!("{kind}_cap")
}

fn as_int(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

fn int_field(value: &Value, field: &str) -> Option<i64> {
    value.get(field).and_then(as_int)
}

/// Insert the default policy rows that are not already present.
pub async fn seed_default_policy(store: &OpsStore) -> StoreResult<usize> {
    let defaults = [
        (
            AUTO_APPROVE,
            json!({"enabled": true, "kinds": ["analysis", "content", "research"]}),
        ),
        (DAILY_PROPOSAL_CAP, json!({"max": DEFAULT_DAILY_MAX})),
        ("content_cap", json!({"max_per_day": 20})),
        (
            STALE_STEP_TIMEOUT_MIN,
            json!({"value": DEFAULT_STALE_TIMEOUT_MIN}),
        ),
    ];
    let mut seeded = 0;
    for (key, value) in defaults {
        if store.seed_policy(key, &value).await? {
            seeded += 1;
        }
    }
    if seeded > 0 {
        info!("Seeded {} default policy rows", seeded);
    }
    Ok(seeded)
}
