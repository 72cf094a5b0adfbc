//! Response timing middleware
//!
//! Implemented as a Tower Layer/Service. Stamps `X-Response-Time` on every
//! response, propagates the request ID and records request metrics.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};
use metrics::{counter, gauge, histogram};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

use crate::request_log::ceil_millis;

pub const RESPONSE_TIME_HEADER: &str = "x-response-time";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tower Layer for response timing
#[derive(Clone, Default)]
pub struct ResponseTimeLayer;

impl<S> Layer<S> for ResponseTimeLayer {
    type Service = ResponseTime<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseTime { inner }
    }
}

#[derive(Clone)]
pub struct ResponseTime<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for ResponseTime<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let method = request.method().to_string();
        let path = normalize_path(request.uri().path());

        let request_id = match request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    request.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                id
            }
        };

        gauge!("roster_http_requests_in_flight").increment(1.0);
        let start = Instant::now();

        let mut inner = self.inner.clone();
        let span = tracing::info_span!("request", request_id = %request_id);

        Box::pin(
            async move {
                let result = inner.call(request).await;
                gauge!("roster_http_requests_in_flight").decrement(1.0);
                let mut response = result?;

                let elapsed = start.elapsed();
                let status = response.status().as_u16().to_string();
                counter!("roster_http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status)
                    .increment(1);
                histogram!("roster_http_request_duration_seconds", "method" => method, "path" => path)
                    .record(elapsed.as_secs_f64());

                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&format!("{}ms", ceil_millis(elapsed))) {
                    headers.insert(RESPONSE_TIME_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    headers.insert(REQUEST_ID_HEADER, value);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Collapse numeric ID segments to `{id}` to keep metric labels bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
