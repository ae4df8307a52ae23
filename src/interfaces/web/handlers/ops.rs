use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::super::AppState;
use super::ApiResult;

const EVENT_LIMIT: usize = 100;
const ACTION_RUN_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct EventFilter {
    kind: Option<String>,
}

pub async fn health_endpoint(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db = state.engine.store.ping().await;
    let status = if db {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "db": db })))
}

pub async fn list_events_endpoint(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> ApiResult<Json<Value>> {
    let kind = filter.kind.as_deref().filter(|k| !k.is_empty());
    let events = state.engine.store.list_events(kind, EVENT_LIMIT).await?;
    Ok(Json(json!({ "events": events })))
}

pub async fn run_heartbeat_endpoint(State(state): State<AppState>) -> Json<Value> {
    let actions = state.engine.heartbeat.run_once().await;
    Json(json!({ "actions": actions }))
}

pub async fn list_policy_endpoint(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let policy = state.engine.store.list_policy().await?;
    Ok(Json(json!({ "policy": policy })))
}

pub async fn list_action_runs_endpoint(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let action_runs = state.engine.store.list_action_runs(ACTION_RUN_LIMIT).await?;
    Ok(Json(json!({ "action_runs": action_runs })))
}

pub async fn routing_endpoint(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.engine.router.routing_table().await))
}
