use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::ApiError;

/// Extension type injected into every request so the middleware can read the
/// configured token.
#[derive(Clone)]
pub struct AuthToken(pub String);

/// Axum middleware: require `Authorization: Bearer <token>` on the data
/// routes when a token is configured. An empty token disables the check
/// (local development).
pub async fn require_auth(request: Request, next: Next) -> Response {
    let token = request
        .extensions()
        .get::<AuthToken>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    if token.is_empty() {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let expected = format!("Bearer {token}");
    if constant_time_eq(auth_header.as_bytes(), expected.as_bytes()) {
        return next.run(request).await;
    }

    ApiError::Unauthorized.into_response()
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_requires_exact_match() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secre7"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
    }
}
