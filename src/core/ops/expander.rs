use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::OpsError;
use super::templates::StepTemplates;
use crate::core::store::OpsStore;
use crate::core::store::types::{MissionWithSteps, NewStep};

pub const SOURCE: &str = "proposal_service";

/// Materializes an approved proposal into a mission and its queued steps.
#[derive(Clone)]
pub struct MissionExpander {
    store: OpsStore,
    templates: Arc<StepTemplates>,
}

impl MissionExpander {
    pub fn new(store: OpsStore, templates: Arc<StepTemplates>) -> Self {
        Self { store, templates }
    }

    pub async fn expand(
        &self,
        proposal_id: &str,
        title: &str,
        kind: &str,
    ) -> Result<MissionWithSteps, OpsError> {
        let steps: Vec<NewStep> = self
            .templates
            .steps_for(kind, title)
            .into_iter()
            .map(|t| NewStep {
                kind: t.kind,
                title: t.title,
                input: json!({ "proposal_id": proposal_id, "kind": kind }),
            })
            .collect();

        let created = self
            .store
            .create_mission_with_steps(proposal_id, title, &steps)
            .await?;

        // The mission is committed at this point; a lost audit row must not
        // turn it into "no mission" for the caller.
        if let Err(e) = self
            .store
            .add_event(
                "mission.created",
                Some(SOURCE),
                Some(&json!({
                    "mission_id": created.mission.id,
                    "proposal_id": proposal_id,
                    "step_count": created.steps.len(),
                })),
            )
            .await
        {
            warn!("Failed to record mission.created for {}: {}", created.mission.id, e);
        }
        info!(
            "Mission {} created for proposal {} ({} steps)",
            created.mission.id,
            proposal_id,
            created.steps.len()
        );
        Ok(created)
    }
}
