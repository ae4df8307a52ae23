use serde_json::json;
use tracing::{error, info, warn};

use super::OpsError;
use super::expander::{MissionExpander, SOURCE};
use super::policy_gate::PolicyGate;
use crate::core::store::OpsStore;
use crate::core::store::types::{MissionWithSteps, ProposalRecord, ProposalStatus};

pub const REQUIRED_FIELDS: &str = "Required: agent_id, kind, title";

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProposalOutcome {
    pub proposal: ProposalRecord,
    pub mission: Option<MissionWithSteps>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalOutcome {
    pub proposal_id: String,
    pub mission: Option<MissionWithSteps>,
}

/// Single entry point for creating and deciding work.
#[derive(Clone)]
pub struct ProposalService {
    store: OpsStore,
    gate: PolicyGate,
    expander: MissionExpander,
}

impl ProposalService {
    pub fn new(store: OpsStore, gate: PolicyGate, expander: MissionExpander) -> Self {
        Self {
            store,
            gate,
            expander,
        }
    }

    pub async fn create_proposal(
        &self,
        agent_id: &str,
        kind: &str,
        title: &str,
        body: Option<&str>,
    ) -> Result<ProposalOutcome, OpsError> {
        let (agent_id, kind, title) = (agent_id.trim(), kind.trim(), title.trim());
        if agent_id.is_empty() || kind.is_empty() || title.is_empty() {
            return Err(OpsError::Validation(REQUIRED_FIELDS.to_string()));
        }

        let daily = self.gate.check_daily_cap(agent_id).await?;
        if !daily.allowed {
            warn!("Proposal rejected (daily cap): {} - {}", agent_id, daily.reason);
            return Err(self.admission_rejected(agent_id, kind, daily.reason).await);
        }
        let per_kind = self.gate.check_kind_cap(kind).await?;
        if !per_kind.allowed {
            warn!("Proposal rejected (kind cap): {} - {}", kind, per_kind.reason);
            return Err(self.admission_rejected(agent_id, kind, per_kind.reason).await);
        }

        let snapshot = self.store.policy_snapshot().await?;
        let mut proposal = self
            .store
            .insert_proposal(agent_id, kind, title, body, ProposalStatus::Pending, &snapshot)
            .await?;
        self.store
            .add_event(
                "proposal.created",
                Some(SOURCE),
                Some(&json!({
                    "proposal_id": proposal.id,
                    "agent_id": agent_id,
                    "kind": kind,
                })),
            )
            .await?;

        if !self.gate.should_auto_approve(kind).await? {
            info!("Proposal pending review: {} [{}] by {}", title, kind, agent_id);
            return Ok(ProposalOutcome {
                proposal,
                mission: None,
            });
        }

        if !self
            .store
            .decide_proposal(&proposal.id, ProposalStatus::Approved)
            .await?
        {
            // Someone decided it between insert and here; report what is stored.
            if let Some(current) = self.store.get_proposal(&proposal.id).await? {
                proposal = current;
            }
            return Ok(ProposalOutcome {
                proposal,
                mission: None,
            });
        }
        self.store
            .add_event(
                "proposal.approved",
                Some(SOURCE),
                Some(&json!({ "proposal_id": proposal.id, "auto": true })),
            )
            .await?;
        if let Some(current) = self.store.get_proposal(&proposal.id).await? {
            proposal = current;
        }

        let mission = self.expand_or_log(&proposal).await;
        info!("Proposal auto-approved: {} [{}] by {}", title, kind, agent_id);
        Ok(ProposalOutcome { proposal, mission })
    }

    pub async fn approve_proposal(&self, id: &str) -> Result<ApprovalOutcome, OpsError> {
        let proposal = self
            .store
            .get_proposal(id)
            .await?
            .ok_or_else(|| OpsError::NotFound("Proposal not found".to_string()))?;
        match proposal.status {
            ProposalStatus::Pending => {}
            ProposalStatus::Approved => return self.resume_expansion(&proposal).await,
            ProposalStatus::Rejected => return Err(not_pending(&proposal)),
        }
        if !self
            .store
            .decide_proposal(id, ProposalStatus::Approved)
            .await?
        {
            let current = self.store.get_proposal(id).await?.unwrap_or(proposal);
            return Err(not_pending(&current));
        }

        self.store
            .add_event(
                "proposal.approved",
                Some(SOURCE),
                Some(&json!({ "proposal_id": id, "auto": false })),
            )
            .await?;
        info!("Proposal approved: {} [{}]", proposal.title, proposal.kind);

        let mission = self.expand_or_log(&proposal).await;
        Ok(ApprovalOutcome {
            proposal_id: id.to_string(),
            mission,
        })
    }

    /// An approved proposal without a mission had its expansion fail; expand
    /// it again. The unique `proposal_id` on missions keeps this single-shot.
    async fn resume_expansion(
        &self,
        proposal: &ProposalRecord,
    ) -> Result<ApprovalOutcome, OpsError> {
        if self
            .store
            .get_mission_for_proposal(&proposal.id)
            .await?
            .is_some()
        {
            return Err(not_pending(proposal));
        }
        warn!(
            "Proposal {} is approved without a mission; retrying expansion",
            proposal.id
        );
        let mission = self.expand_or_log(proposal).await;
        Ok(ApprovalOutcome {
            proposal_id: proposal.id.clone(),
            mission,
        })
    }

    pub async fn reject_proposal(&self, id: &str, reason: Option<&str>) -> Result<(), OpsError> {
        if !self
            .store
            .decide_proposal(id, ProposalStatus::Rejected)
            .await?
        {
            return Err(match self.store.get_proposal(id).await? {
                Some(current) => not_pending(&current),
                None => OpsError::NotFound("Proposal not found".to_string()),
            });
        }
        self.store
            .add_event(
                "proposal.rejected",
                Some(SOURCE),
                Some(&json!({ "proposal_id": id, "reason": reason })),
            )
            .await?;
        info!("Proposal rejected: {} ({})", id, reason.unwrap_or("no reason"));
        Ok(())
    }

    /// Record a gate rejection and build the error returned to the caller.
    /// No proposal row exists for these.
    async fn admission_rejected(&self, agent_id: &str, kind: &str, reason: String) -> OpsError {
        if let Err(e) = self
            .store
            .add_event(
                "proposal.rejected",
                Some(SOURCE),
                Some(&json!({ "agent_id": agent_id, "kind": kind, "reason": reason })),
            )
            .await
        {
            warn!("Failed to record admission rejection: {}", e);
        }
        OpsError::Admission(reason)
    }

    async fn expand_or_log(&self, proposal: &ProposalRecord) -> Option<MissionWithSteps> {
        match self
            .expander
            .expand(&proposal.id, &proposal.title, &proposal.kind)
            .await
        {
            Ok(mission) => Some(mission),
            Err(e) => {
                error!("Mission expansion failed for proposal {}: {}", proposal.id, e);
                None
            }
        }
    }
}

fn not_pending(proposal: &ProposalRecord) -> OpsError {
    OpsError::State(format!(
        "Proposal is '{}', not 'pending'",
        proposal.status.as_str()
    ))
}
