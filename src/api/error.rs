//! HTTP error mapping.
//!
//! Converts [`EngramError`] kinds to status codes and a JSON body of the form
//! `{"error": {"code", "message", "details"?}}`. Internal failures (storage,
//! upstream) return an opaque message plus a correlation ID; the detailed
//! cause goes to the log under that ID.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::EngramError;

/// Result type for HTTP handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub EngramError);

impl From<EngramError> for ApiError {
    fn from(error: EngramError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = match &error {
            // Opaque message + correlation ID for internal failures.
            EngramError::Storage(detail) | EngramError::Upstream(detail) => {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(correlation_id = %correlation_id, detail = %detail, code = error.code(), "internal error");
                json!({
                    "error": {
                        "code": error.code(),
                        "message": "internal error; see server logs",
                        "correlation_id": correlation_id,
                    }
                })
            }
            EngramError::RateLimited { retry_after_seconds } => json!({
                "error": {
                    "code": error.code(),
                    "message": error.to_string(),
                    "retry_after_seconds": retry_after_seconds,
                }
            }),
            _ => json!({
                "error": {
                    "code": error.code(),
                    "message": error.to_string(),
                }
            }),
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            if let EngramError::RateLimited { retry_after_seconds } = &error {
                let mut response = (status, Json(body)).into_response();
                if let Ok(value) = retry_after_seconds.to_string().parse() {
                    response.headers_mut().insert("retry-after", value);
                }
                return response;
            }
        }

        // Unauthorized responses advertise the accepted scheme.
        if status == StatusCode::UNAUTHORIZED {
            body["error"]["www_authenticate"] = json!("Bearer");
            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = "Bearer".parse() {
                response.headers_mut().insert("www-authenticate", value);
            }
            return response;
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        let response = ApiError(EngramError::invalid("bad")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(EngramError::not_found("memory", "x")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError(EngramError::AlreadyExists("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response =
            ApiError(EngramError::RateLimited { retry_after_seconds: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "7");

        let response = ApiError(EngramError::Storage("db down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError(EngramError::Upstream("embedder".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = ApiError(EngramError::Timeout("knn".into())).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
