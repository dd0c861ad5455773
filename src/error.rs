use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{qr::QrError, validate::ValidationError};

/// Failures surfaced by the JSON API. Every variant renders as
/// `{"error": "..."}` with the matching status code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unauthorized - Cloudflare Access required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<QrError> for ApiError {
    fn from(err: QrError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Unauthorized => {
                return (StatusCode::UNAUTHORIZED, self.to_string()).into_response();
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::RateLimited { retry_after } => {
                let body = Json(json!({
                    "error": "Rate limit exceeded",
                    "retryAfter": retry_after,
                }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after.to_string())],
                    body,
                )
                    .into_response();
            }
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_owned(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_owned(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Validation(ValidationError::UrlScheme), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("Link not found"), StatusCode::NOT_FOUND),
            (ApiError::Conflict("Code already taken"), StatusCode::CONFLICT),
            (ApiError::RateLimited { retry_after: 5 }, StatusCode::TOO_MANY_REQUESTS),
            (ApiError::Database(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
