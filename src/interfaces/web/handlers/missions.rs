use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use super::super::AppState;
use super::proposals::StatusFilter;
use super::{ApiError, ApiResult};
use crate::core::store::types::MissionStatus;

const LIST_LIMIT: usize = 50;

pub async fn list_missions_endpoint(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Value>> {
    let status = match filter.status() {
        None => None,
        Some(s) => Some(MissionStatus::from_status(s).ok_or_else(|| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Unknown status '{}'", s))
        })?),
    };
    let missions = state.engine.store.list_missions(status, LIST_LIMIT).await?;
    Ok(Json(json!({ "missions": missions })))
}

pub async fn get_mission_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let mission = state
        .engine
        .store
        .get_mission(&id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Mission not found"))?;
    let steps = state.engine.store.list_mission_steps(&id).await?;
    Ok(Json(json!({ "mission": mission, "steps": steps })))
}
