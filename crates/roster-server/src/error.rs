//! Domain error to HTTP response mapping
//!
//! Bodies are `{"detail": "..."}`. Storage failures are logged and redacted.
//! Extractor rejections keep axum's status and text under the same key.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use roster_core::RosterError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Domain(RosterError),
    /// Body, path or query that could not be extracted
    Rejected { status: StatusCode, detail: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Domain(err) => match err {
                RosterError::UserNotFound
                | RosterError::GroupNotFound
                | RosterError::UserIdNotFound(_)
                | RosterError::GroupIdNotFound(_) => StatusCode::NOT_FOUND,
                RosterError::Conflict(_) => StatusCode::CONFLICT,
                RosterError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Rejected { status, .. } => *status,
        }
    }
}

impl From<RosterError> for ApiError {
    fn from(e: RosterError) -> Self {
        Self::Domain(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Domain(RosterError::Storage(cause)) => {
                tracing::error!("Storage error: {}", cause);
                "Internal server error".to_string()
            }
            ApiError::Domain(other) => other.to_string(),
            ApiError::Rejected { detail, .. } => {
                tracing::debug!("Rejected request: {}", detail);
                detail
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use roster_core::ConflictField;

    async fn body_of(err: RosterError) -> (StatusCode, serde_json::Value) {
        let response = ApiError::from(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_found_is_404() {
        let (status, body) = body_of(RosterError::UserNotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "User not found"}));

        let (status, body) = body_of(RosterError::GroupIdNotFound(3)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Group with id 3 not found"}));
    }

    #[tokio::test]
    async fn conflict_is_409() {
        let (status, body) = body_of(RosterError::Conflict(ConflictField::GroupName)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"detail": "Group name already exists"}));
    }

    #[tokio::test]
    async fn storage_error_is_redacted() {
        let (status, body) = body_of(RosterError::Storage("disk I/O error".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"detail": "Internal server error"}));
    }
}
