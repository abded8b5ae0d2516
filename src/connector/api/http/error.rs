use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// JSON error body returned by every failing handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status: String,
    pub code: u16,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: impl Into<String>, code: u16, detail: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            code,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new("bad_request", 400, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("not_found", 404, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new("service_unavailable", 503, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new("internal_error", 500, detail)
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match &error {
            DomainError::ValidationError(_) => Self::bad_request(error.to_string()),
            DomainError::NotFound(_) => Self::not_found(error.to_string()),
            DomainError::BackendUnavailable(_) => Self::unavailable(error.to_string()),
            _ => {
                tracing::error!("Request failed: {}", error);
                Self::internal(error.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (DomainError::validation("bad"), 400),
            (DomainError::not_found("gone"), 404),
            (DomainError::unavailable("down"), 503),
            (DomainError::mirror("graph"), 500),
            (DomainError::storage("query"), 500),
            (DomainError::embedding("model"), 500),
        ];

        for (error, code) in cases {
            assert_eq!(ApiError::from(error).code, code);
        }
    }

    #[test]
    fn error_body_carries_detail() {
        let json = serde_json::to_string(&ApiError::not_found("Document not found: x")).unwrap();
        assert!(json.contains("not_found"));
        assert!(json.contains("Document not found: x"));
    }
}
