use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::super::AppState;
use super::{ApiError, ApiResult};
use crate::core::ops::proposals::REQUIRED_FIELDS;
use crate::core::store::types::ProposalStatus;

const LIST_LIMIT: usize = 50;

#[derive(Deserialize, Default)]
struct CreateProposalRequest {
    agent_id: Option<String>,
    kind: Option<String>,
    title: Option<String>,
    body: Option<String>,
}

#[derive(Deserialize, Default)]
struct RejectRequest {
    reason: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusFilter {
    status: Option<String>,
}

impl StatusFilter {
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| !s.is_empty())
    }
}

/// Missing, empty or malformed bodies all read as "fields missing".
fn parse_body<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Option<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Some(T::default());
    }
    serde_json::from_slice(body).ok()
}

pub async fn create_proposal_endpoint(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let req: CreateProposalRequest = parse_body(&body)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, REQUIRED_FIELDS))?;
    let outcome = state
        .engine
        .proposals
        .create_proposal(
            req.agent_id.as_deref().unwrap_or_default(),
            req.kind.as_deref().unwrap_or_default(),
            req.title.as_deref().unwrap_or_default(),
            req.body.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

pub async fn list_proposals_endpoint(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Value>> {
    let status = match filter.status() {
        None => None,
        Some(s) => Some(ProposalStatus::from_status(s).ok_or_else(|| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Unknown status '{}'", s))
        })?),
    };
    let proposals = state.engine.store.list_proposals(status, LIST_LIMIT).await?;
    Ok(Json(json!({ "proposals": proposals })))
}

pub async fn approve_proposal_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .engine
        .proposals
        .approve_proposal(&id)
        .await
        .map_err(ApiError::decision)?;
    Ok(Json(json!(outcome)))
}

pub async fn reject_proposal_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let req: RejectRequest = parse_body(&body).unwrap_or_default();
    state
        .engine
        .proposals
        .reject_proposal(&id, req.reason.as_deref())
        .await
        .map_err(ApiError::decision)?;
    Ok(Json(json!({ "ok": true })))
}
