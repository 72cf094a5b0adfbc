//! Request pipeline stages shared by every route group
//!
//! Stages are listed outermost first and folded into layers once, when the
//! router is built.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::AppError;
use crate::middleware::{
    error_translation_middleware, negotiate_middleware, ssl_middleware, ResponseTimeLayer,
};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Uniform error bodies, request logging, 5xx notification
    ErrorTranslation,
    /// Turns handler panics into 500s the translation stage can render
    CatchPanic,
    /// `X-Response-Time`, request IDs, request metrics
    ResponseTime,
    /// Redirect or refuse plain-transport requests
    Ssl,
    /// Re-render envelopes per `Accept`
    ContentNegotiation,
}

impl Stage {
    /// Outermost first. The auth stages sit inside these, per route group.
    pub const ORDER: [Stage; 5] = [
        Stage::ErrorTranslation,
        Stage::CatchPanic,
        Stage::ResponseTime,
        Stage::Ssl,
        Stage::ContentNegotiation,
    ];

    fn wrap(self, router: Router, state: &AppState) -> Router {
        match self {
            Stage::ErrorTranslation => router.layer(from_fn_with_state(
                state.error_state(),
                error_translation_middleware,
            )),
            Stage::CatchPanic => router.layer(CatchPanicLayer::custom(panic_response)),
            Stage::ResponseTime => router.layer(ResponseTimeLayer),
            Stage::Ssl => router.layer(from_fn_with_state(state.ssl_config(), ssl_middleware)),
            Stage::ContentNegotiation => router.layer(from_fn(negotiate_middleware)),
        }
    }
}

/// Wrap `router` in every stage of [`Stage::ORDER`]
pub fn apply(router: Router, state: &AppState) -> Router {
    // Layers added last run first
    Stage::ORDER
        .iter()
        .rev()
        .fold(router, |router, stage| stage.wrap(router, state))
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(panic = %detail, "Handler panicked");
    AppError::Internal(anyhow::anyhow!("Handler panicked: {}", detail)).into_response()
}
