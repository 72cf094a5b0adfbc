//! Error translation middleware
//!
//! Outermost stage. Every failed response, whether an [`AppError`] from an
//! inner stage or a bare 4xx/5xx from the framework, is rewritten into the
//! uniform error body, negotiated like any other envelope. Headers set by
//! inner stages (cookie clearing, timing) survive. Afterwards the request is
//! reported to the request logger and, for server errors, the notifier.
//!
//! [`AppError`]: crate::error::AppError

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, WWW_AUTHENTICATE},
        HeaderValue, Request, StatusCode,
    },
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::Envelope;
use crate::error::{ErrorRecord, Failure};
use crate::middleware::negotiate::accept_header;
use crate::negotiate::{negotiate, render, Representation};
use crate::notify::Notifier;
use crate::request_log::{RequestDescriptor, RequestLogger};

/// Root element of error bodies
pub const ERROR_ROOT: &str = "error";

const NOTIFY_SUBJECT: &str = "Roster API 500 error";

/// Shared state for the error translation middleware
#[derive(Clone)]
pub struct ErrorTranslationState {
    expose_stack_traces: bool,
    logger: Arc<dyn RequestLogger>,
    notifier: Arc<dyn Notifier>,
    notify_recipient: Option<String>,
}

impl ErrorTranslationState {
    pub fn new(
        expose_stack_traces: bool,
        logger: Arc<dyn RequestLogger>,
        notifier: Arc<dyn Notifier>,
        notify_recipient: Option<String>,
    ) -> Self {
        Self {
            expose_stack_traces,
            logger,
            notifier,
            notify_recipient,
        }
    }
}

/// Error translation middleware function
pub async fn error_translation_middleware(
    State(state): State<ErrorTranslationState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let mut descriptor = RequestDescriptor::from_request(&request);
    let accept = accept_header(&request);

    let response = next.run(request).await;

    let failure = failure_of(&response);
    let response = match &failure {
        Some(failure) => translate(&state, response, failure, accept.as_deref()),
        None => response,
    };

    let elapsed = started.elapsed();
    descriptor.complete(&response, elapsed);
    report(&state, &descriptor, elapsed, failure.as_ref()).await;

    response
}

/// Failure carried by a response, or one derived from a bare error status
fn failure_of(response: &Response) -> Option<Failure> {
    if let Some(failure) = response.extensions().get::<Failure>() {
        return Some(failure.clone());
    }

    let status = response.status();
    (status.is_client_error() || status.is_server_error()).then(|| Failure::from_status(status))
}

fn translate(
    state: &ErrorTranslationState,
    response: Response,
    failure: &Failure,
    accept: Option<&str>,
) -> Response {
    let (mut parts, _) = response.into_parts();
    parts.status = failure.status;
    parts.headers.remove(CONTENT_LENGTH);

    let stack = match failure.status {
        StatusCode::NO_CONTENT => {
            parts.headers.remove(CONTENT_TYPE);
            return Response::from_parts(parts, Body::empty());
        }
        StatusCode::UNAUTHORIZED => {
            parts
                .headers
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
            None
        }
        StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::NOT_ACCEPTABLE
        | StatusCode::CONFLICT => None,
        status => {
            if status.is_server_error() {
                tracing::error!(
                    status = status.as_u16(),
                    trace = %failure.trace,
                    "{}",
                    failure.message
                );
            }
            state.expose_stack_traces.then(|| failure.trace.clone())
        }
    };

    let record = ErrorRecord {
        message: failure.message.clone(),
        stack,
    };
    let (content_type, bytes) = render_error(&record, accept);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    Response::from_parts(parts, Body::from(bytes))
}

/// Error body in the client's preferred representation, JSON when nothing
/// else is acceptable
fn render_error(record: &ErrorRecord, accept: Option<&str>) -> (&'static str, Vec<u8>) {
    let representation = negotiate(accept).unwrap_or(Representation::Json);
    let rendered = Envelope::from_serialize(ERROR_ROOT, record)
        .and_then(|envelope| render(representation, &envelope));

    match rendered {
        Ok(bytes) => (representation.content_type(), bytes),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to render error body");
            let bytes = serde_json::to_vec(record).unwrap_or_default();
            (Representation::Json.content_type(), bytes)
        }
    }
}

async fn report(
    state: &ErrorTranslationState,
    descriptor: &RequestDescriptor,
    elapsed: Duration,
    failure: Option<&Failure>,
) {
    if let Err(e) = state.logger.access(descriptor, elapsed).await {
        tracing::warn!(error = %e, "Failed to record access log");
    }

    let Some(failure) = failure else {
        return;
    };

    if let Err(e) = state.logger.error(descriptor, failure).await {
        tracing::warn!(error = %e, "Failed to record error log");
    }

    if !failure.status.is_server_error() {
        return;
    }

    match &state.notify_recipient {
        Some(recipient) => {
            if let Err(e) = state
                .notifier
                .notify(recipient, NOTIFY_SUBJECT, &failure.trace, descriptor)
                .await
            {
                tracing::warn!(error = %e, "Failed to send error notification");
            }
        }
        None => tracing::debug!("No notification recipient configured"),
    }
}
