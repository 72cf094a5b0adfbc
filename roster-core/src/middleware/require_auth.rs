//! Bearer authentication middleware for the API route group
//!
//! Every request must carry a valid `Authorization: Bearer <token>` header
//! (or the configured override credential). There is no anonymous access and
//! no refresh: an expired token is rejected like any other bad token.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::borrow::Cow;

use crate::error::AppError;
use crate::jwt::{JwtManager, VerifyOptions};
use crate::middleware::auth::{ApiPrincipal, Principal};

/// Shared state for bearer authentication middleware
#[derive(Clone)]
pub struct AuthMiddlewareState {
    jwt_manager: JwtManager,
    override_authorization: Option<String>,
}

impl AuthMiddlewareState {
    pub fn new(jwt_manager: JwtManager, override_authorization: Option<String>) -> Self {
        Self {
            jwt_manager,
            override_authorization,
        }
    }
}

/// Authentication enforcement middleware
///
/// Requests are rejected with 401 when:
/// - no secret key is configured
/// - neither an Authorization header nor an override credential is present
/// - the scheme is not Bearer, or the token is missing
/// - the token fails verification for any reason, expiry included
pub async fn require_auth_middleware(
    State(auth_state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&auth_state, request.headers()) {
        Ok(principal) => {
            request.extensions_mut().insert(ApiPrincipal(principal));
            next.run(request).await
        }
        Err(err) => {
            metrics::counter!("roster_auth_rejected_total", "flow" => "bearer").increment(1);
            err.into_response()
        }
    }
}

fn authenticate(state: &AuthMiddlewareState, headers: &HeaderMap) -> Result<Principal, AppError> {
    if !state.jwt_manager.has_secret() {
        return Err(unauthorized("No JWT secret key available"));
    }

    let authorization: Cow<'_, str> = match headers.get(AUTHORIZATION) {
        Some(value) => Cow::Borrowed(
            value
                .to_str()
                .map_err(|_| unauthorized("Invalid authorisation"))?,
        ),
        None => Cow::Owned(
            state
                .override_authorization
                .clone()
                .ok_or_else(|| unauthorized("Authorisation required"))?,
        ),
    };

    let token = extract_bearer_token(&authorization)?;

    let claims = state
        .jwt_manager
        .verify(token, VerifyOptions::default())
        .map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            unauthorized("Invalid authentication")
        })?;

    Ok(Principal::from_claims(claims, None))
}

/// Token part of a `Bearer <token>` credential
fn extract_bearer_token(authorization: &str) -> Result<&str, AppError> {
    let (scheme, token) = authorization
        .split_once(' ')
        .ok_or_else(|| unauthorized("Invalid authorisation"))?;

    if scheme != "Bearer" {
        return Err(unauthorized("Invalid authorisation"));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(unauthorized("Invalid authorisation"));
    }

    Ok(token)
}

fn unauthorized(message: &str) -> AppError {
    AppError::Unauthorized(message.to_string())
}
