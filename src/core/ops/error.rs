use crate::core::store::StoreError;

/// Typed outcome of every engine operation that can fail.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Admission(String),
    #[error("{0}")]
    State(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Execution(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OpsError {
    pub fn status_code(&self) -> u16 {
        match self {
            OpsError::Validation(_) | OpsError::State(_) => 400,
            OpsError::Admission(_) => 429,
            OpsError::NotFound(_) => 404,
            OpsError::Execution(_) => 500,
            OpsError::Store(StoreError::Unavailable(_)) => 503,
            OpsError::Store(_) => 500,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, OpsError::Store(StoreError::Unavailable(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(OpsError::Validation("x".into()).status_code(), 400);
        assert_eq!(OpsError::Admission("x".into()).status_code(), 429);
        assert_eq!(OpsError::State("x".into()).status_code(), 400);
        assert_eq!(OpsError::NotFound("x".into()).status_code(), 404);
        assert_eq!(OpsError::Execution("x".into()).status_code(), 500);
        let down = OpsError::from(StoreError::Unavailable("database is locked".into()));
        assert_eq!(down.status_code(), 503);
        assert!(down.is_unavailable());
    }
}
