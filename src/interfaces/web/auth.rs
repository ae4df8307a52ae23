use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.settings.api_key.as_deref() else {
        // No key configured: open access only on loopback.
        if state.settings.is_loopback() {
            return next.run(req).await;
        }
        return unauthorized(
            "No API key configured. Set MC_API_KEY before exposing the API on a non-loopback address.",
        );
    };

    match presented_key(req.headers()) {
        Some(key) if keys_match(&key, expected) => next.run(req).await,
        Some(_) => unauthorized("Invalid API key"),
        None => unauthorized("Missing API key. Use the x-api-key header or Authorization: Bearer <key>"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// `x-api-key` wins over `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.trim().to_string());
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

/// Length-independent comparison so response timing does not leak a prefix.
fn keys_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;
    use crate::core::ops::OpsEngine;
    use crate::core::store::OpsStore;
    use axum::{Router, middleware, response::IntoResponse, routing::get};
    use serde_json::json;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn test_state(api_host: &str, api_key: Option<&str>) -> AppState {
        let store = OpsStore::in_memory().await.expect("store");
        let mut settings = Settings::default();
        settings.api_host = api_host.to_string();
        settings.api_key = api_key.map(str::to_string);
        let (log_tx, _) = tokio::sync::broadcast::channel(8);
        AppState {
            engine: OpsEngine::new(store, &settings),
            settings: Arc::new(settings),
            log_tx,
        }
    }

    fn protected_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/ops/ping",
                get(|| async { axum::Json(json!({ "ok": true })).into_response() }),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::require_auth,
            ))
            .with_state(state)
    }

    async fn request_ping_status(app: Router, headers: Vec<(&str, String)>) -> StatusCode {
        let mut req_builder = Request::builder().uri("/api/ops/ping");
        for (k, v) in headers {
            req_builder = req_builder.header(k, v);
        }
        let req = req_builder
            .body(Body::empty())
            .expect("request should build");
        app.oneshot(req)
            .await
            .expect("oneshot should succeed")
            .status()
    }

    #[test]
    fn key_comparison_rejects_prefixes_and_extensions() {
        assert!(keys_match("s3cret", "s3cret"));
        assert!(!keys_match("s3cre", "s3cret"));
        assert!(!keys_match("s3cret!", "s3cret"));
        assert!(!keys_match("", "s3cret"));
    }

    #[tokio::test]
    async fn no_key_on_loopback_allows_request() {
        let app = protected_app(test_state("127.0.0.1", None).await);
        assert_eq!(request_ping_status(app, vec![]).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn no_key_on_non_loopback_rejects_request() {
        let app = protected_app(test_state("0.0.0.0", None).await);
        assert_eq!(
            request_ping_status(app, vec![]).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn configured_key_is_required_even_on_loopback() {
        let app = protected_app(test_state("127.0.0.1", Some("k1")).await);
        assert_eq!(
            request_ping_status(app, vec![]).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn key_accepted_from_either_header() {
        let state = test_state("0.0.0.0", Some("k1")).await;
        let status =
            request_ping_status(protected_app(state.clone()), vec![("x-api-key", "k1".into())])
                .await;
        assert_eq!(status, StatusCode::OK);
        let status = request_ping_status(
            protected_app(state.clone()),
            vec![("authorization", "Bearer k1".into())],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let status =
            request_ping_status(protected_app(state), vec![("x-api-key", "wrong".into())]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
