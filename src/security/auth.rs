//! API-key and admin authentication.
//!
//! Keys are accepted via `X-API-Key`, `Authorization: Bearer`, or the
//! `api_key` query parameter (permitted but logged as less secure). All
//! comparisons are constant-time. Admin endpoints additionally require HTTP
//! Basic credentials.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, Uri};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;

use crate::api::error::ApiError;
use crate::error::EngramError;
use crate::security::{rate_limit, SecurityState};

/// Compare two byte strings without early exit, so timing does not leak the
/// position of the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Pull the API key from headers or query string.
fn extract_api_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    if let Some(authorization) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = authorization.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    if let Some(query) = uri.query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("api_key=") {
                tracing::debug!("API key supplied via query parameter (less secure)");
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Validate the request's API key against the configured secret.
pub fn validate_api_key(
    config: &crate::config::SecurityConfig,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<(), EngramError> {
    if !config.enable_auth {
        return Ok(());
    }
    let Some(expected) = &config.api_secret_key else {
        tracing::error!("API auth enabled but no api_secret_key configured");
        return Err(EngramError::Unauthorized("server auth misconfigured".into()));
    };
    let Some(provided) = extract_api_key(headers, uri) else {
        return Err(EngramError::Unauthorized(
            "API key required: use X-API-Key header, Authorization Bearer, or api_key query param"
                .into(),
        ));
    };
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(EngramError::Unauthorized("invalid API key".into()));
    }
    Ok(())
}

/// Validate HTTP Basic credentials for the admin surface.
pub fn validate_basic_auth(
    config: &crate::config::SecurityConfig,
    headers: &HeaderMap,
) -> Result<(), EngramError> {
    let Some(expected_password) = &config.admin_password else {
        return Err(EngramError::Unauthorized(
            "admin credentials not configured".into(),
        ));
    };

    let credentials = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or_else(|| EngramError::Unauthorized("basic auth required".into()))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(credentials)
        .map_err(|_| EngramError::Unauthorized("malformed basic auth".into()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| EngramError::Unauthorized("malformed basic auth".into()))?;

    let Some((username, password)) = decoded.split_once(':') else {
        return Err(EngramError::Unauthorized("malformed basic auth".into()));
    };

    let user_ok = constant_time_eq(username.as_bytes(), config.admin_username.as_bytes());
    let pass_ok = constant_time_eq(password.as_bytes(), expected_password.as_bytes());
    if !(user_ok && pass_ok) {
        return Err(EngramError::Unauthorized("invalid admin credentials".into()));
    }
    Ok(())
}

/// Middleware: rate limit then API-key check. Applied to every authenticated
/// route; `/health` and `/` are mounted outside this layer.
pub async fn security_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.security.enable_auth {
        let client = rate_limit::client_key(request.headers(), None);
        state.limiter.check(&client).map_err(ApiError::from)?;
    }
    validate_api_key(&state.config.security, request.headers(), request.uri())
        .map_err(ApiError::from)?;
    Ok(next.run(request).await)
}

/// Middleware for `/api/v1/admin/*`: HTTP Basic on top of the API key the
/// outer layer already enforced.
pub async fn admin_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    validate_basic_auth(&state.config.security, request.headers()).map_err(ApiError::from)?;
    Ok(next.run(request).await)
}
