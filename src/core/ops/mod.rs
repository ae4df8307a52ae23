//! Proposal → mission → step orchestration.
//!
//! Components never call each other across processes; they coordinate only
//! through guarded updates on the shared [`OpsStore`].

mod error;
pub mod expander;
pub mod heartbeat;
pub mod policy_gate;
pub mod proposals;
pub mod templates;
pub mod worker;

pub use error::OpsError;

use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::llm::{Completer, ModelRouter};
use crate::core::store::OpsStore;
use expander::MissionExpander;
use heartbeat::Heartbeat;
use policy_gate::PolicyGate;
use proposals::ProposalService;
use templates::{RoleRegistry, StepTemplates};
use worker::{Worker, WorkerConfig};

/// Every engine component wired to one store and one set of settings.
#[derive(Clone)]
pub struct OpsEngine {
    pub store: OpsStore,
    pub proposals: ProposalService,
    pub heartbeat: Heartbeat,
    pub router: ModelRouter,
    pub roles: Arc<RoleRegistry>,
}

impl OpsEngine {
    pub fn new(store: OpsStore, settings: &Settings) -> Self {
        let templates = StepTemplates::with_overrides(&settings.step_templates);
        Self::with_templates(store, settings, templates)
    }

    pub fn with_templates(store: OpsStore, settings: &Settings, templates: StepTemplates) -> Self {
        let gate = PolicyGate::new(store.clone());
        let expander = MissionExpander::new(store.clone(), Arc::new(templates));
        let proposals = ProposalService::new(store.clone(), gate.clone(), expander);
        let heartbeat = Heartbeat::new(store.clone(), gate);
        let router = ModelRouter::from_settings(settings, Some(store.clone()));
        Self {
            store,
            proposals,
            heartbeat,
            router,
            roles: Arc::new(RoleRegistry::default()),
        }
    }

    pub fn worker(&self, completer: Arc<dyn Completer>, config: WorkerConfig) -> Worker {
        Worker::new(
            self.store.clone(),
            self.router.clone(),
            completer,
            self.roles.clone(),
            config,
        )
    }
}

#[cfg(test)]
mod tests;
