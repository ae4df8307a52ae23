use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use super::OpsError;
use super::policy_gate::PolicyGate;
use crate::core::store::OpsStore;
use crate::core::store::types::ActionRunStatus;

pub const SOURCE: &str = "heartbeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    RecoverStaleSteps,
    LogHeartbeat,
}

impl HeartbeatAction {
    pub const DEFAULT_ORDER: [HeartbeatAction; 2] = [
        HeartbeatAction::RecoverStaleSteps,
        HeartbeatAction::LogHeartbeat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HeartbeatAction::RecoverStaleSteps => "recoverStaleSteps",
            HeartbeatAction::LogHeartbeat => "logHeartbeat",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionResult {
    pub action: String,
    pub status: ActionRunStatus,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Periodic maintenance sweep. Each action is timed and recorded as an
/// action run; a failing action never stops the ones after it.
#[derive(Clone)]
pub struct Heartbeat {
    store: OpsStore,
    gate: PolicyGate,
    actions: Vec<HeartbeatAction>,
}

impl Heartbeat {
    pub fn new(store: OpsStore, gate: PolicyGate) -> Self {
        Self {
            store,
            gate,
            actions: HeartbeatAction::DEFAULT_ORDER.to_vec(),
        }
    }

    pub async fn run_once(&self) -> Vec<ActionResult> {
        info!("Heartbeat tick starting ({} actions)", self.actions.len());
        let mut results = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            let result = self.run_action(*action).await;
            info!(
                "  {} -> {} ({}ms)",
                result.action,
                result.status.as_str(),
                result.duration_ms
            );
            results.push(result);
        }
        results
    }

    async fn run_action(&self, action: HeartbeatAction) -> ActionResult {
        let started = Instant::now();
        let outcome = match action {
            HeartbeatAction::RecoverStaleSteps => self.recover_stale_steps().await,
            HeartbeatAction::LogHeartbeat => self.log_heartbeat().await,
        };
        let duration_ms = started.elapsed().as_millis() as i64;

        let (status, details, error) = match outcome {
            Ok(details) => (ActionRunStatus::Ok, details, None),
            Err(e) => {
                error!("Heartbeat action '{}' failed: {}", action.name(), e);
                let message = e.to_string();
                (
                    ActionRunStatus::Error,
                    json!({ "error": message }),
                    Some(message),
                )
            }
        };
        if let Err(e) = self
            .store
            .add_action_run(action.name(), status, &details, duration_ms)
            .await
        {
            warn!("Could not record action run for {}: {}", action.name(), e);
        }

        ActionResult {
            action: action.name().to_string(),
            status,
            duration_ms,
            error,
        }
    }

    /// Fail every step running longer than the policy timeout and queue a
    /// fresh copy of it.
    pub async fn recover_stale_steps(&self) -> Result<Value, OpsError> {
        let timeout_min = self.gate.stale_step_timeout_min().await?;
        let stale = self.store.list_stale_steps(timeout_min).await?;

        let mut recovered = 0;
        for step in stale {
            let Some(replacement) = self.store.requeue_stale_step(&step.id, timeout_min).await?
            else {
                // Finished by its worker after the scan.
                continue;
            };
            recovered += 1;
            // The requeue is committed; a lost event must not stop the sweep.
            if let Err(e) = self
                .store
                .add_event(
                    "step.recovered",
                    Some(SOURCE),
                    Some(&json!({
                        "old_step_id": step.id,
                        "new_step_id": replacement.id,
                        "kind": step.kind,
                        "timeout_min": timeout_min,
                    })),
                )
                .await
            {
                warn!("Failed to record recovery of step {}: {}", step.id, e);
            }
        }
        if recovered > 0 {
            info!("Recovered {} stale steps (timeout={}min)", recovered, timeout_min);
        }
        Ok(json!({ "recovered": recovered, "timeout_min": timeout_min }))
    }

    pub async fn log_heartbeat(&self) -> Result<Value, OpsError> {
        self.store.add_event("heartbeat.tick", Some(SOURCE), None).await?;
        Ok(json!({ "tick": true }))
    }

    /// Register a repeated job that runs the sweep every `interval`.
    pub async fn schedule(self, scheduler: &JobScheduler, interval: Duration) -> anyhow::Result<()> {
        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let heartbeat = self.clone();
            Box::pin(async move {
                heartbeat.run_once().await;
            })
        })?;
        scheduler.add(job).await?;
        info!("Heartbeat scheduled every {}s", interval.as_secs());
        Ok(())
    }
}
