use axum::{
    Json, Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{missions, ops, proposals};

fn build_cors(origin: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(auth::API_KEY_HEADER),
        ])
}

pub fn build_api_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/api/ops/health", get(ops::health_endpoint));

    let authed_routes = Router::new()
        .route(
            "/api/ops/proposals",
            get(proposals::list_proposals_endpoint).post(proposals::create_proposal_endpoint),
        )
        .route(
            "/api/ops/proposals/{id}/approve",
            post(proposals::approve_proposal_endpoint),
        )
        .route(
            "/api/ops/proposals/{id}/reject",
            post(proposals::reject_proposal_endpoint),
        )
        .route("/api/ops/missions", get(missions::list_missions_endpoint))
        .route("/api/ops/missions/{id}", get(missions::get_mission_endpoint))
        .route("/api/ops/events", get(ops::list_events_endpoint))
        .route("/api/ops/heartbeat", post(ops::run_heartbeat_endpoint))
        .route("/api/ops/policy", get(ops::list_policy_endpoint))
        .route("/api/ops/action-runs", get(ops::list_action_runs_endpoint))
        .route("/api/ops/routing", get(ops::routing_endpoint))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    public_routes
        .merge(authed_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.settings.max_body_bytes))
        .layer(middleware::from_fn(security_headers))
        .layer(build_cors(&state.settings.cors_origin))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    response
}
