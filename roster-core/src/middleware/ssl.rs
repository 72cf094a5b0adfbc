//! SSL enforcement middleware
//!
//! Insecure GET/HEAD requests are redirected to their `https://` equivalent;
//! any other insecure request is refused. Runs ahead of authentication so
//! credentials are never processed over plain transport.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::SslConfig;
use crate::error::AppError;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// SSL enforcement middleware function
pub async fn ssl_middleware(
    State(config): State<SslConfig>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if config.disabled || is_secure(&request, config.trust_proxy) {
        return next.run(request).await;
    }

    if request.method() == Method::GET || request.method() == Method::HEAD {
        return match https_location(&request) {
            Some(location) => redirect(location),
            None => AppError::BadRequest("Host header required".to_string()).into_response(),
        };
    }

    tracing::info!(method = %request.method(), uri = %request.uri(), "Refused insecure request");
    AppError::Forbidden("Secure transport required".to_string()).into_response()
}

/// Whether the request arrived over TLS, directly or via a trusted proxy
pub fn is_secure<B>(request: &Request<B>, trust_proxy: bool) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }

    trust_proxy
        && request
            .headers()
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// `https://` URL for the same host, path and query
fn https_location<B>(request: &Request<B>) -> Option<String> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))?;
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Some(format!("https://{}{}", host, path))
}

fn redirect(location: String) -> Response {
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            let mut response = StatusCode::MOVED_PERMANENTLY.into_response();
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => AppError::BadRequest("Invalid Host header".to_string()).into_response(),
    }
}
