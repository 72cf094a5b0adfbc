//! Cookie session middleware for browser routes
//!
//! The session token travels in the signed `session-jwt` cookie. Per request
//! the cookie resolves to one of:
//!
//! | Cookie                              | Outcome        | Effect                          |
//! |-------------------------------------|----------------|---------------------------------|
//! | absent (or cookie signature bad)    | `Anonymous`    | no principal                    |
//! | valid and unexpired                 | `Authenticated`| principal, cookie untouched     |
//! | expired, otherwise valid            | `Refreshed`    | principal, replacement cookie   |
//! | malformed / mis-signed token        | `Rejected`     | cookie cleared, 401             |
//! | any other verification failure      | `Failed`       | 500                             |
//!
//! A refreshed token gets a full lifetime from now. When the claims carry
//! `remember`, the cookie itself is also given an outer expiry of
//! `remember_days` from now, so an active session keeps sliding forward and
//! an idle one lapses. A handler that writes the session cookie itself
//! (login, logout) wins over the replacement.

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{HOST, SET_COOKIE},
        HeaderMap, Request, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::jwt::{JwtManager, VerifyError, VerifyOptions};
use crate::middleware::auth::{Principal, SessionPrincipal};

/// Session cookie name
pub const SESSION_COOKIE: &str = "session-jwt";

/// Shared state for the cookie session middleware
#[derive(Clone)]
pub struct SessionState {
    jwt_manager: JwtManager,
    key: Key,
    strip_prefixes: Arc<[String]>,
    remember: time::Duration,
}

impl SessionState {
    pub fn new(
        jwt_manager: JwtManager,
        key: Key,
        strip_prefixes: Vec<String>,
        remember_days: i64,
    ) -> Self {
        Self {
            jwt_manager,
            key,
            strip_prefixes: strip_prefixes.into(),
            remember: time::Duration::days(remember_days),
        }
    }

    pub fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Cookie domain for a request host
    pub fn domain_for(&self, host: Option<&str>) -> Option<String> {
        host.and_then(|h| cookie_domain(h, &self.strip_prefixes))
    }

    /// Outer expiry for a remembered session, starting now
    pub fn remember_until(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() + self.remember
    }
}

/// Result of resolving the session cookie
#[derive(Debug)]
pub enum CookieSession {
    Anonymous,
    Authenticated(Principal),
    Refreshed {
        principal: Principal,
        replacement: String,
        remember: bool,
    },
    Rejected,
    Failed(AppError),
}

/// Resolve a cookie-borne token. Pure apart from reading the clock.
pub fn resolve(jwt_manager: &JwtManager, token: Option<&str>) -> CookieSession {
    let Some(token) = token else {
        return CookieSession::Anonymous;
    };

    match jwt_manager.verify(token, VerifyOptions::default()) {
        Ok(claims) => CookieSession::Authenticated(Principal::from_claims(
            claims,
            Some(token.to_string()),
        )),
        Err(VerifyError::Expired) => refresh(jwt_manager, token),
        Err(VerifyError::InvalidToken) => CookieSession::Rejected,
        Err(e) => CookieSession::Failed(AppError::Internal(e.into())),
    }
}

fn refresh(jwt_manager: &JwtManager, token: &str) -> CookieSession {
    let claims = match jwt_manager.verify(token, VerifyOptions::ignoring_expiration()) {
        Ok(claims) => claims,
        Err(VerifyError::InvalidToken) => return CookieSession::Rejected,
        Err(e) => return CookieSession::Failed(AppError::Internal(e.into())),
    };

    match jwt_manager.reissue(&claims) {
        Ok((replacement, renewed)) => CookieSession::Refreshed {
            remember: renewed.remembers(),
            principal: Principal::from_claims(renewed, Some(replacement.clone())),
            replacement,
        },
        Err(e) => CookieSession::Failed(e),
    }
}

/// Cookie session middleware function
pub async fn cookie_session_middleware(
    State(state): State<SessionState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let jar = SignedCookieJar::from_headers(request.headers(), state.key.clone());
    let domain = state.domain_for(request_host(&request).as_deref());
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

    match resolve(&state.jwt_manager, token.as_deref()) {
        CookieSession::Anonymous => next.run(request).await,
        CookieSession::Authenticated(principal) => {
            request.extensions_mut().insert(SessionPrincipal(principal));
            next.run(request).await
        }
        CookieSession::Refreshed {
            principal,
            replacement,
            remember,
        } => {
            tracing::debug!(sub = %principal.subject_id, remember, "Session token refreshed");
            metrics::counter!("roster_session_refresh_total").increment(1);
            let expires = remember.then(|| state.remember_until());
            let jar = jar.add(session_cookie(replacement, domain, expires));

            request.extensions_mut().insert(SessionPrincipal(principal));
            let response = next.run(request).await;
            if sets_session_cookie(response.headers()) {
                return response;
            }
            (jar, response).into_response()
        }
        CookieSession::Rejected => {
            tracing::info!("Rejected tampered or malformed session cookie");
            metrics::counter!("roster_auth_rejected_total", "flow" => "session").increment(1);
            let jar = jar.remove(removal_cookie(domain));
            (
                jar,
                AppError::Unauthorized("Invalid authentication".to_string()),
            )
                .into_response()
        }
        CookieSession::Failed(err) => err.into_response(),
    }
}

/// Whether a response already writes the session cookie
pub fn sets_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .any(|c| c.name() == SESSION_COOKIE)
}

/// Build the session cookie carrying `token`
pub fn session_cookie(
    token: String,
    domain: Option<String>,
    expires: Option<OffsetDateTime>,
) -> Cookie<'static> {
    let mut builder = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true);
    if let Some(domain) = domain {
        builder = builder.domain(domain);
    }
    if let Some(expires) = expires {
        builder = builder.expires(expires);
    }
    builder.build()
}

/// Cookie used to clear the session; must match the issued name and domain
pub fn removal_cookie(domain: Option<String>) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE).path("/");
    if let Some(domain) = domain {
        builder = builder.domain(domain);
    }
    builder.build()
}

/// Host name of the request, without port
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    host_of(request.headers(), request.uri())
}

/// Host name from the `Host` header, falling back to an absolute URI
pub fn host_of(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.host())?;
    Some(strip_port(host).to_ascii_lowercase())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_inclusive(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

/// Parent domain shared by the application's subdomains.
///
/// The first matching prefix is stripped once. IP addresses and single-label
/// hosts (e.g. `localhost`) get host-only cookies.
pub fn cookie_domain(host: &str, strip_prefixes: &[String]) -> Option<String> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || bare.parse::<IpAddr>().is_ok() || !host.contains('.') {
        return None;
    }

    let domain = strip_prefixes
        .iter()
        .find_map(|prefix| host.strip_prefix(prefix.as_str()))
        .unwrap_or(host);
    Some(domain.to_string())
}
