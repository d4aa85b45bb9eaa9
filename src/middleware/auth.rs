use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::state::AppState;

/// Extract a bearer token from the Authorization header
fn extract_bearer(request: &Request) -> Result<&str, AppError> {
    let header = request
        .headers()
        .get("authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".to_string()))
}

/// Guards the on-prem poll/submit routes.
///
/// When `onprem.poller_token` is configured, the request must carry
/// `Authorization: Bearer <token>`. The comparison is constant-time. With no
/// token configured every request passes.
pub async fn poller_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.onprem.poller_token.as_ref() else {
        return Ok(next.run(request).await);
    };

    let path = request.uri().path().to_string();
    let token = extract_bearer(&request)?;

    if bool::from(token.as_bytes().ct_eq(expected.expose().as_bytes())) {
        tracing::debug!(path = %path, "Poller authenticated");
        Ok(next.run(request).await)
    } else {
        tracing::warn!(path = %path, "Poller authentication failed: token mismatch");
        Err(AppError::Unauthorized("Invalid poller token".to_string()))
    }
}
