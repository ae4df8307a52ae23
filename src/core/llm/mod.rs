pub mod ollama;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::config::Settings;
use crate::core::store::OpsStore;

/// External text-generation capability used by workers.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

async fn complete_bounded(
    completer: &dyn Completer,
    prompt: &str,
    model: &str,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, completer.complete(prompt, model, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "model {} timed out after {}s",
            model,
            timeout.as_secs()
        )),
    }
}

/// Try `primary`, then `fallback` once if it is a different model.
pub async fn complete_with_fallback(
    completer: &dyn Completer,
    prompt: &str,
    primary: &str,
    fallback: &str,
    timeout: Duration,
) -> Result<Completion> {
    match complete_bounded(completer, prompt, primary, timeout).await {
        Ok(text) => Ok(Completion {
            text,
            model: primary.to_string(),
        }),
        Err(e) if primary != fallback => {
            warn!("Model {} failed ({}), trying fallback {}", primary, e, fallback);
            let text = complete_bounded(completer, prompt, fallback, timeout)
                .await
                .map_err(|fallback_err| {
                    anyhow!("primary {primary} failed: {e}; fallback {fallback} failed: {fallback_err}")
                })?;
            Ok(Completion {
                text,
                model: fallback.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RouteEntry {
    pub source: String,
    pub model: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutingTable {
    pub default: String,
    pub fallback: String,
    pub overrides: BTreeMap<String, RouteEntry>,
}

/// Resolves the model an agent's steps run on.
///
/// Priority: environment override, store override, static table, default.
#[derive(Clone)]
pub struct ModelRouter {
    default_model: String,
    fallback_model: String,
    static_overrides: BTreeMap<String, String>,
    env_overrides: HashMap<String, String>,
    store: Option<OpsStore>,
}

impl ModelRouter {
    pub fn from_settings(settings: &Settings, store: Option<OpsStore>) -> Self {
        Self {
            default_model: settings.default_model.clone(),
            fallback_model: settings.fallback_model.clone(),
            static_overrides: settings.static_model_overrides.clone(),
            env_overrides: settings.env_model_overrides.clone(),
            store,
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback_model
    }

    pub async fn resolve(&self, agent_id: Option<&str>) -> String {
        let Some(agent_id) = agent_id.map(str::trim).filter(|a| !a.is_empty()) else {
            return self.default_model.clone();
        };

        if let Some(model) = self.env_overrides.get(&agent_id.to_lowercase()) {
            return model.clone();
        }

        if let Some(store) = &self.store {
            match store.get_agent_model(agent_id).await {
                Ok(Some(model)) => return model,
                Ok(None) => {}
                Err(e) => debug!("Agent model lookup for {} skipped: {}", agent_id, e),
            }
        }

        self.static_overrides
            .get(agent_id)
            .filter(|m| !m.is_empty())
            .cloned()
            .unwrap_or_else(|| self.default_model.clone())
    }

    pub async fn routing_table(&self) -> RoutingTable {
        let mut overrides = BTreeMap::new();
        for (agent, model) in &self.static_overrides {
            if !model.is_empty() {
                overrides.insert(agent.clone(), route("static", model));
            }
        }
        if let Some(store) = &self.store {
            match store.list_agent_models().await {
                Ok(rows) => {
                    for row in rows {
                        if let Some(model) = row.model_override.filter(|m| !m.is_empty()) {
                            overrides.insert(row.agent_id, route("db", &model));
                        }
                    }
                }
                Err(e) => debug!("Routing table without store overrides: {}", e),
            }
        }
        for (agent, model) in &self.env_overrides {
            overrides.insert(agent.clone(), route("env", model));
        }
        RoutingTable {
            default: self.default_model.clone(),
            fallback: self.fallback_model.clone(),
            overrides,
        }
    }
}

fn route(source: &str, model: &str) -> RouteEntry {
    RouteEntry {
        source: source.to_string(),
        model: model.to_string(),
    }
}
