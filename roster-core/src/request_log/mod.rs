//! Access and error logging for completed requests
//!
//! The error translation stage reports every request through a
//! [`RequestLogger`]. [`CappedRequestLog`] keeps the most recent records in
//! bounded in-memory buffers and mirrors them to `tracing`.

use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, Request, Uri},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Environment;
use crate::error::Failure;

/// Default number of records kept per log
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// What the logs know about a request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestDescriptor {
    pub request_id: String,
    pub method: String,
    pub host: Option<String>,
    pub url: String,
    pub ip: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    /// Response status, 0 until the response is known
    pub status: u16,
    /// Duration in milliseconds, rounded up
    pub ms: u64,
    /// `Location` of a redirect response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

fn header_string(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Client address as reported by a proxy
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_string(headers, "x-real-ip"))
}

/// Query parameters whose values never reach the logs
const REDACTED_PARAMS: &[&str] = &["password", "token", "jwt", "access_token", "authorization"];

/// Path and query with credential-bearing parameter values masked
pub fn redacted_url(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };

    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if REDACTED_PARAMS.iter().any(|p| key.eq_ignore_ascii_case(p)) => {
                format!("{key}=[REDACTED]")
            }
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", uri.path(), pairs.join("&"))
}

/// Milliseconds, rounded up
pub fn ceil_millis(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    nanos.div_ceil(1_000_000) as u64
}

impl RequestDescriptor {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let headers = request.headers();
        Self {
            request_id: header_string(headers, "x-request-id")
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            method: request.method().to_string(),
            host: header_string(headers, header::HOST),
            url: redacted_url(request.uri()),
            ip: client_ip(headers),
            referrer: header_string(headers, header::REFERER),
            user_agent: header_string(headers, header::USER_AGENT),
            status: 0,
            ms: 0,
            redirect: None,
        }
    }

    /// Fill in the outcome once the response is known
    pub fn complete(&mut self, response: &Response, elapsed: Duration) {
        self.status = response.status().as_u16();
        self.ms = ceil_millis(elapsed);
        // The timing stage assigns IDs to requests that arrive without one
        if let Some(id) = header_string(response.headers(), "x-request-id") {
            self.request_id = id;
        }
        if response.status().is_redirection() {
            self.redirect = header_string(response.headers(), header::LOCATION);
        }
    }
}

/// Sink for access and error records. Implementations report their own
/// failures; callers log and discard them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestLogger: Send + Sync {
    async fn access(&self, request: &RequestDescriptor, duration: Duration) -> anyhow::Result<()>;
    async fn error(&self, request: &RequestDescriptor, failure: &Failure) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub request: RequestDescriptor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub request: RequestDescriptor,
    pub message: String,
    /// Diagnostic trace, kept for server errors only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Bounded in-memory request log.
///
/// Oldest records are dropped once a buffer is full. Nothing is recorded in
/// development.
pub struct CappedRequestLog {
    environment: Environment,
    capacity: usize,
    access: Mutex<VecDeque<AccessEntry>>,
    errors: Mutex<VecDeque<ErrorEntry>>,
}

impl CappedRequestLog {
    pub fn new(environment: Environment) -> Self {
        Self::with_capacity(environment, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(environment: Environment, capacity: usize) -> Self {
        Self {
            environment,
            capacity,
            access: Mutex::new(VecDeque::with_capacity(capacity)),
            errors: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn enabled(&self) -> bool {
        self.environment != Environment::Development && self.capacity > 0
    }

    pub async fn recent_access(&self) -> Vec<AccessEntry> {
        self.access.lock().await.iter().cloned().collect()
    }

    pub async fn recent_errors(&self) -> Vec<ErrorEntry> {
        self.errors.lock().await.iter().cloned().collect()
    }

    fn push<T>(buffer: &mut VecDeque<T>, capacity: usize, entry: T) {
        while buffer.len() >= capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }
}

#[async_trait]
impl RequestLogger for CappedRequestLog {
    async fn access(&self, request: &RequestDescriptor, duration: Duration) -> anyhow::Result<()> {
        if !self.enabled() {
            return Ok(());
        }

        tracing::info!(
            target: "roster_core::access",
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            status = request.status,
            ms = ceil_millis(duration),
            "request"
        );

        let entry = AccessEntry {
            at: Utc::now(),
            request: request.clone(),
        };
        let mut access = self.access.lock().await;
        Self::push(&mut access, self.capacity, entry);
        Ok(())
    }

    async fn error(&self, request: &RequestDescriptor, failure: &Failure) -> anyhow::Result<()> {
        if !self.enabled() {
            return Ok(());
        }

        tracing::info!(
            target: "roster_core::access",
            request_id = %request.request_id,
            status = failure.status.as_u16(),
            kind = failure.kind,
            "request failed: {}",
            failure.message
        );

        let entry = ErrorEntry {
            at: Utc::now(),
            request: request.clone(),
            message: failure.message.clone(),
            stack: failure
                .status
                .is_server_error()
                .then(|| failure.trace.clone()),
        };
        let mut errors = self.errors.lock().await;
        Self::push(&mut errors, self.capacity, entry);
        Ok(())
    }
}
