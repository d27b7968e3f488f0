//! # Admin Authentication
//!
//! The review route is guarded by a static bearer token
//! (`VDIR_ADMIN_TOKEN`). Public directory routes are not authenticated.
//! When no token is configured the admin routes are open, which is only
//! intended for local development.
//!
//! Token comparisons run in constant time.

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use crate::error::{ErrorBody, ErrorDetail};

/// Admin bearer token configuration, carried as a request extension.
///
/// Custom `Debug` redacts the token.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Compare two secrets without leaking where they differ.
///
/// A length mismatch still performs a full comparison so the timing does
/// not reveal the expected length.
pub fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Require `Authorization: Bearer <admin token>` on admin routes.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();

    let expected = match config.and_then(|c| c.token) {
        Some(token) => token,
        None => return next.run(request).await,
    };

    let provided = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => value,
        None => return unauthorized_response("missing Authorization header"),
    };

    let token = match provided.strip_prefix("Bearer ") {
        Some(token) => token,
        None => return unauthorized_response("expected Bearer token"),
    };

    if !constant_time_token_eq(token, &expected) {
        tracing::warn!("rejected admin request with invalid token");
        return unauthorized_response("invalid admin token");
    }

    next.run(request).await
}
