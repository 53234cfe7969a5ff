//! Response envelope and error taxonomy shared by every API module.
//!
//! All endpoints answer with the same discriminated shape:
//! `{"success": true, "data": ...}` or `{"success": false, "error": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Successful handler result; serializes as the `success: true` envelope.
pub struct ApiOk<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for ApiOk<T> {
    fn into_response(self) -> Response {
        Json(ApiResponse {
            success: true,
            data: Some(self.0),
            error: None,
        })
        .into_response()
    }
}

pub type ApiResult<T> = Result<ApiOk<T>, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Database(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("monthly ticket quota exhausted ({used} of {limit} used)")]
    QuotaExceeded { used: u32, limit: u32 },
    #[error("{0}")]
    InvalidOperation(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            Self::InvalidOperation(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Database(ref e) = self {
            log::error!("database error: {e}");
        }
        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
        });
        (self.status(), body).into_response()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record"),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_carries_data() {
        let body = serde_json::to_value(ApiResponse {
            success: true,
            data: Some(vec![1, 2, 3]),
            error: None,
        })
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([1, 2, 3]));
        assert!(body.get("error").is_none());
    }

    #[test]
    fn error_envelope_omits_data() {
        let body = serde_json::to_value(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some("ticket not found".into()),
        })
        .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "ticket not found");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn not_found_maps_from_diesel() {
        let err: ApiError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn quota_error_is_forbidden() {
        let err = ApiError::QuotaExceeded { used: 4, limit: 4 };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            err.to_string(),
            "monthly ticket quota exhausted (4 of 4 used)"
        );
    }
}
