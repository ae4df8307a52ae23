use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::OpsError;
use super::templates::RoleRegistry;
use crate::core::llm::{Completer, ModelRouter, complete_with_fallback};
use crate::core::store::OpsStore;
use crate::core::store::types::{MissionStatus, StepRecord, StepStatus};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub kind: String,
    pub worker_id: String,
    pub poll_interval: Duration,
    pub capability_timeout: Duration,
}

impl WorkerConfig {
    /// `OPS_WORKER_ID` style explicit id, else `<kind>-<hostname>-<pid>`.
    pub fn default_worker_id(kind: &str) -> String {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        format!("{}-{}-{}", kind, host, std::process::id())
    }
}

/// What happened to a claimed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed { model: String },
    Failed { error: String },
    /// The step left `running` under this worker before the result landed,
    /// typically because the heartbeat recovered it. Nothing was written.
    Abandoned,
}

/// Processes steps of one kind, one at a time.
pub struct Worker {
    store: OpsStore,
    router: ModelRouter,
    completer: Arc<dyn Completer>,
    roles: Arc<RoleRegistry>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: OpsStore,
        router: ModelRouter,
        completer: Arc<dyn Completer>,
        roles: Arc<RoleRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            router,
            completer,
            roles,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.worker_id
    }

    /// Non-blocking: returns `None` immediately when nothing is claimable.
    pub async fn claim_step(&self) -> Result<Option<StepRecord>, OpsError> {
        let step = self
            .store
            .claim_next_step(&self.config.kind, &self.config.worker_id)
            .await?;
        if let Some(step) = &step {
            info!("Claimed step {}: {}", step.id, step.title);
        }
        Ok(step)
    }

    pub async fn process(&self, step: &StepRecord) -> Result<StepOutcome, OpsError> {
        let agent_id = self.agent_for(step).await;
        let model = self.router.resolve(agent_id.as_deref()).await;
        let prompt = self.roles.build_prompt(&step.kind, &step.title, &step.input);

        self.emit(
            "step.started",
            json!({ "step_id": step.id, "model": model }),
        )
        .await;

        let result = complete_with_fallback(
            self.completer.as_ref(),
            &prompt,
            &model,
            self.router.fallback(),
            self.config.capability_timeout,
        )
        .await;

        let outcome = match result {
            Ok(completion) => {
                let output = json!({ "result": completion.text, "model": completion.model });
                if !self.finish(step, StepStatus::Completed, &output).await? {
                    return Ok(StepOutcome::Abandoned);
                }
                self.emit(
                    "step.completed",
                    json!({
                        "step_id": step.id,
                        "mission_id": step.mission_id,
                        "model": completion.model,
                    }),
                )
                .await;
                info!("Step {} completed (model={})", step.id, completion.model);
                StepOutcome::Completed {
                    model: completion.model,
                }
            }
            Err(e) => {
                // Recorded on the step, never returned to the loop.
                let failure = OpsError::Execution(e.to_string());
                let message = failure.to_string();
                error!("Step {} failed: {}", step.id, message);
                let output = json!({ "error": message });
                if !self.finish(step, StepStatus::Failed, &output).await? {
                    return Ok(StepOutcome::Abandoned);
                }
                self.emit(
                    "step.failed",
                    json!({ "step_id": step.id, "error": message }),
                )
                .await;
                StepOutcome::Failed { error: message }
            }
        };

        self.check_mission_completion(&step.mission_id).await?;
        Ok(outcome)
    }

    /// Finalize the mission once every step is terminal. Only the caller
    /// whose guarded update flips the mission emits `mission.completed`.
    pub async fn check_mission_completion(
        &self,
        mission_id: &str,
    ) -> Result<Option<MissionStatus>, OpsError> {
        let counts = self.store.count_mission_steps(mission_id).await?;
        if !counts.all_terminal() {
            return Ok(None);
        }
        let status = if counts.failed == 0 {
            MissionStatus::Completed
        } else {
            MissionStatus::Failed
        };
        if !self.store.finish_mission_if_active(mission_id, status).await? {
            return Ok(None);
        }
        self.emit(
            "mission.completed",
            json!({
                "mission_id": mission_id,
                "status": status.as_str(),
                "steps_done": counts.completed,
                "steps_failed": counts.failed,
            }),
        )
        .await;
        info!(
            "Mission {} -> {} (done={}, failed={})",
            mission_id,
            status.as_str(),
            counts.completed,
            counts.failed
        );
        Ok(Some(status))
    }

    /// Claim and process at most one step. Returns whether a step was found.
    pub async fn run_once(&self) -> Result<bool, OpsError> {
        match self.claim_step().await? {
            Some(step) => {
                self.process(&step).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Worker {} starting (kind={}, poll={}s)",
            self.config.worker_id,
            self.config.kind,
            self.config.poll_interval.as_secs()
        );
        while !cancel.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(found) => !found,
                Err(e) if e.is_unavailable() => {
                    warn!("Store unavailable, retrying next cycle: {}", e);
                    true
                }
                Err(e) => {
                    error!("Worker loop error: {}", e);
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        info!("Worker {} stopped.", self.config.worker_id);
    }

    async fn finish(
        &self,
        step: &StepRecord,
        status: StepStatus,
        output: &Value,
    ) -> Result<bool, OpsError> {
        let written = self
            .store
            .finish_step(&step.id, &self.config.worker_id, status, output)
            .await?;
        if !written {
            warn!(
                "Step {} is no longer running under {}; dropping result",
                step.id, self.config.worker_id
            );
        }
        Ok(written)
    }

    async fn agent_for(&self, step: &StepRecord) -> Option<String> {
        let proposal_id = step.input.get("proposal_id").and_then(Value::as_str)?;
        match self.store.get_proposal(proposal_id).await {
            Ok(found) => found.map(|p| p.agent_id),
            Err(e) => {
                debug!("Proposal lookup for step {} failed: {}", step.id, e);
                None
            }
        }
    }

    async fn emit(&self, kind: &str, payload: Value) {
        if let Err(e) = self
            .store
            .add_event(kind, Some(&self.config.worker_id), Some(&payload))
            .await
        {
            warn!("Failed to record {} event: {}", kind, e);
        }
    }
}
