//! Bearer Token Authentication
//!
//! Two layers guard the API:
//!
//! - **User auth** — the `AuthedAccount` extractor resolves the
//!   `Authorization: Bearer <token>` credential to its account through the
//!   platform store before the handler body runs. Disabled accounts are
//!   refused.
//! - **Admin auth** — console endpoints sit behind a static token read from
//!   the `NIMBUS_ADMIN_TOKEN` environment variable. If unset, admin access
//!   is **open** (suitable for dev only; startup logs a warning).

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::json;

use nimbus_core::account::Account;
use nimbus_core::error::PlatformError;

use crate::metrics::prometheus as metrics;
use crate::ApiState;

/// Read the admin token from the environment (cached on first call).
pub fn admin_token() -> Option<String> {
    use std::sync::OnceLock;
    static TOKEN: OnceLock<Option<String>> = OnceLock::new();
    TOKEN
        .get_or_init(|| {
            std::env::var("NIMBUS_ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
        })
        .clone()
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({"ok": false, "error": message})))
}

/// Extractor: the account behind the request's bearer credential.
pub struct AuthedAccount(pub Account);

#[async_trait]
impl FromRequestParts<ApiState> for AuthedAccount {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing bearer token"))?;

        match state.platform.account_by_token(token).await {
            Ok(Some(account)) if account.is_active => Ok(AuthedAccount(account)),
            Ok(Some(_)) => Err(reject(StatusCode::FORBIDDEN, "Account is disabled")),
            Ok(None) => Err(reject(StatusCode::UNAUTHORIZED, "Invalid token")),
            Err(PlatformError::Storage(msg)) => {
                metrics::inc_storage_errors();
                tracing::error!("Auth lookup failed: {}", msg);
                Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Storage error"))
            }
            Err(e) => Err(reject(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())),
        }
    }
}

/// Axum middleware: require `Authorization: Bearer <token>` on admin routes.
///
/// If `NIMBUS_ADMIN_TOKEN` is not set → pass through (no auth).
/// If set → compare constant-time against the provided header.
pub async fn require_admin_token(request: Request, next: Next) -> Result<Response, StatusCode> {
    let expected = match admin_token() {
        Some(t) => t,
        None => return Ok(next.run(request).await), // No token configured → open access
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) if value.starts_with("Bearer ") => {
            let provided = &value[7..];
            // Constant-time comparison to prevent timing attacks
            if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                Ok(next.run(request).await)
            } else {
                Err(StatusCode::UNAUTHORIZED)
            }
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Constant-time byte comparison (prevents timing side-channels).
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
