//! Request gate: bearer-token authentication and the admin check.
//!
//! Routes declare an ordered list of [`Guard`]s; [`authorize`] walks it before
//! the handler runs and stops at the first failure. On success the caller's
//! [`Principal`] is placed in the request extensions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::constants::auth::BEARER_PREFIX;
use crate::services::token_service::{Claims, TokenService};

const MISSING_HEADER: &str = "Authorization header required";
const MALFORMED_HEADER: &str = "Invalid authorization header format";
const BAD_TOKEN: &str = "Invalid or expired token";
const ADMIN_REQUIRED: &str = "Admin access required";

/// The authenticated caller, as stated by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject_id: String,
    pub username: String,
    pub is_admin: bool,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.sub,
            username: claims.username,
            is_admin: claims.is_admin,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized(MISSING_HEADER))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// A valid, unexpired bearer token.
    Authenticated,
    /// The token's subject is an administrator.
    Admin,
}

pub const AUTHENTICATED: &[Guard] = &[Guard::Authenticated];
pub const ADMIN_ONLY: &[Guard] = &[Guard::Authenticated, Guard::Admin];

/// Extracts `<token>` from a header of exactly `Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(ApiError::unauthorized(MISSING_HEADER));
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::unauthorized(MALFORMED_HEADER))?;
    if value.is_empty() {
        return Err(ApiError::unauthorized(MISSING_HEADER));
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_PREFIX), Some(token), None) => Ok(token),
        _ => Err(ApiError::unauthorized(MALFORMED_HEADER)),
    }
}

fn authenticate(tokens: &TokenService, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = bearer_token(headers)?;
    tokens
        .verify(token)
        .map(Principal::from)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::unauthorized(BAD_TOKEN)
        })
}

/// Evaluates `guards` in order. An `Admin` guard without a preceding
/// `Authenticated` authenticates first.
pub fn authorize(
    tokens: &TokenService,
    headers: &HeaderMap,
    guards: &[Guard],
) -> Result<Principal, ApiError> {
    let mut principal: Option<Principal> = None;

    for guard in guards {
        match guard {
            Guard::Authenticated => {
                principal = Some(authenticate(tokens, headers)?);
            }
            Guard::Admin => {
                let current = match principal.take() {
                    Some(p) => p,
                    None => authenticate(tokens, headers)?,
                };
                if !current.is_admin {
                    tracing::warn!(username = %current.username, "Admin access denied");
                    return Err(ApiError::forbidden(ADMIN_REQUIRED));
                }
                principal = Some(current);
            }
        }
    }

    principal.ok_or_else(|| ApiError::unauthorized(MISSING_HEADER))
}

async fn gate(
    state: &AppState,
    guards: &[Guard],
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = authorize(state.tokens(), request.headers(), guards)?;

    tracing::Span::current().record("user_id", principal.username.as_str());
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, AUTHENTICATED, request, next).await
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, ADMIN_ONLY, request, next).await
}
