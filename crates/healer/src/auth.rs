//! Bearer token authentication for the heal webhook.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use subtle::ConstantTimeEq;

use crate::error::AuthError;

/// Validate the `Authorization: Bearer <token>` header against the configured secret.
///
/// Fails closed: an unconfigured (or empty) secret rejects every request.
pub fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<(), AuthError> {
    let secret = secret.filter(|s| !s.is_empty()).ok_or(AuthError::NotConfigured)?;

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;

    if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}
