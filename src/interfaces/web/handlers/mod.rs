pub mod missions;
pub mod ops;
pub mod proposals;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::core::ops::OpsError;

/// JSON `{error}` body carrying the status its engine error maps to.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Decision endpoints answer 400 for an unknown proposal; only store
    /// outages keep their own class.
    pub fn decision(err: OpsError) -> Self {
        match err {
            OpsError::NotFound(_) | OpsError::State(_) => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            other => other.into(),
        }
    }
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl From<crate::core::store::StoreError> for ApiError {
    fn from(err: crate::core::store::StoreError) -> Self {
        OpsError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
