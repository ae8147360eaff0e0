//! Admin token verification for the template routes.
//!
//! Callers send `Authorization: Bearer <token>`. The presented token and the
//! configured one are both run through HMAC-SHA256 keyed with the configured
//! token, and the tags are compared in constant time.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use super::handlers::{ApiResponse, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Verify a presented admin token against the configured one.
///
/// Empty tokens never verify.
pub fn verify_admin_token(expected: &str, presented: &str) -> bool {
    if expected.is_empty() || presented.is_empty() {
        warn!(
            has_expected = !expected.is_empty(),
            has_presented = !presented.is_empty(),
            "admin_token_missing"
        );
        return false;
    }

    let tag = |input: &str| -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(expected.as_bytes()).ok()?;
        mac.update(input.as_bytes());
        Some(mac)
    };

    let (reference, candidate) = match (tag(expected), tag(presented)) {
        (Some(reference), Some(candidate)) => (reference, candidate),
        _ => {
            warn!("admin_token_invalid_key");
            return false;
        }
    };

    candidate
        .verify_slice(&reference.finalize().into_bytes())
        .is_ok()
}

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

/// Reject requests without a valid admin token.
///
/// With no token configured every request is rejected.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = match state.config.api_token.as_deref() {
        Some(token) => token,
        None => {
            warn!(path = %request.uri().path(), "admin_token_not_configured");
            return unauthorized();
        }
    };

    match bearer_token(request.headers()) {
        Some(presented) if verify_admin_token(expected, presented) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "admin_auth_invalid");
            unauthorized()
        }
        None => {
            warn!(path = %request.uri().path(), "admin_auth_missing");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::error("unauthorized")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_admin_token() {
        assert!(verify_admin_token("s3cret-token", "s3cret-token"));
        assert!(!verify_admin_token("s3cret-token", "s3cret-tokem"));
        assert!(!verify_admin_token("s3cret-token", "s3cret"));
    }

    #[test]
    fn test_verify_admin_token_empty() {
        assert!(!verify_admin_token("", ""));
        assert!(!verify_admin_token("", "anything"));
        assert!(!verify_admin_token("s3cret-token", ""));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);
    }
}
