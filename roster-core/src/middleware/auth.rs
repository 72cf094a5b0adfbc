//! Authenticated principals and their extractors
//!
//! Provides:
//! - `Principal`, the identity attached to a request by an auth stage
//! - `SessionPrincipal` / `ApiPrincipal`, the request-extension slots for the
//!   cookie and bearer flows (kept apart so the two identities never mix)
//! - `AuthUser` and `SessionUser` extractors for handlers

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;

use crate::error::AppError;
use crate::jwt::{ClaimSet, Role};

/// Authenticated identity derived from verified claims
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    /// Subject (user ID) from the token's `sub` claim
    pub subject_id: String,
    /// Expanded role name
    pub role: Role,
    /// Verified claims the principal was built from
    pub claims: ClaimSet,
    /// Raw token, kept for the cookie flow so it can be relayed to the API
    #[serde(skip)]
    pub token: Option<String>,
}

impl Principal {
    pub fn from_claims(claims: ClaimSet, token: Option<String>) -> Self {
        Self {
            subject_id: claims.sub.clone(),
            role: claims.role.role(),
            claims,
            token,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Fail with `Forbidden` unless the principal is an admin or superuser
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin role required".to_string()))
        }
    }
}

/// Principal established by the cookie session stage
#[derive(Debug, Clone)]
pub struct SessionPrincipal(pub Principal);

/// Principal established by the bearer auth stage
#[derive(Debug, Clone)]
pub struct ApiPrincipal(pub Principal);

/// Extractor for handlers behind bearer auth.
///
/// # Example
///
/// ```ignore
/// async fn protected_handler(AuthUser(user): AuthUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.subject_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ApiPrincipal>()
            .map(|p| AuthUser(p.0.clone()))
            .ok_or_else(|| AppError::Unauthorized("Authorisation required".to_string()))
    }
}

/// Optional session identity from the cookie flow.
///
/// `None` for anonymous requests.
#[derive(Debug, Clone)]
pub struct SessionUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionUser(
            parts.extensions.get::<SessionPrincipal>().map(|p| p.0.clone()),
        ))
    }
}
