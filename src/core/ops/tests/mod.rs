mod admission;
mod decisions;

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use super::OpsEngine;
use super::worker::{Worker, WorkerConfig};
use crate::core::config::Settings;
use crate::core::llm::testing::ScriptedCompleter;
use crate::core::store::OpsStore;

pub(super) fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.default_model = "primary-model".to_string();
    settings.fallback_model = "fallback-model".to_string();
    settings.static_model_overrides.clear();
    settings
}

pub(super) async fn engine_with(policy: &[(&str, Value)]) -> OpsEngine {
    let store = OpsStore::in_memory().await.unwrap();
    for (key, value) in policy {
        store.set_policy(key, value).await.unwrap();
    }
    OpsEngine::new(store, &test_settings())
}

pub(super) async fn engine() -> OpsEngine {
    engine_with(&[(
        "auto_approve",
        json!({"enabled": true, "kinds": ["analysis", "content", "research"]}),
    )])
    .await
}

pub(super) fn worker(engine: &OpsEngine, kind: &str, completer: Arc<ScriptedCompleter>) -> Worker {
    engine.worker(
        completer,
        WorkerConfig {
            kind: kind.to_string(),
            worker_id: format!("{kind}-test"),
            poll_interval: Duration::from_millis(10),
            capability_timeout: Duration::from_secs(5),
        },
    )
}

pub(super) async fn event_kinds(store: &OpsStore) -> Vec<String> {
    let mut kinds: Vec<String> = store
        .list_events(None, 1000)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    kinds.reverse();
    kinds
}
