//! Application state shared by handlers and middleware
//!
//! Everything here is built once at startup and never mutated afterwards.
//! Collaborators sit behind trait objects so tests can swap in fakes.

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::{Config, SslConfig};
use crate::jwt::JwtManager;
use crate::middleware::error_response::ErrorTranslationState;
use crate::middleware::require_auth::AuthMiddlewareState;
use crate::middleware::session::SessionState;
use crate::notify::Notifier;
use crate::repository::UserRepository;
use crate::request_log::RequestLogger;
use crate::service::UserService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt_manager: JwtManager,
    pub cookie_key: Key,
    pub user_service: UserService,
    pub request_log: Arc<dyn RequestLogger>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        user_repo: Arc<dyn UserRepository>,
        request_log: Arc<dyn RequestLogger>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let cookie_key = cookie_key(config.cookie.key.as_deref())?;
        Ok(Self {
            jwt_manager: JwtManager::new(&config.jwt),
            cookie_key,
            user_service: UserService::new(user_repo),
            request_log,
            notifier,
            metrics_handle: None,
            config: Arc::new(config),
        })
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics_handle = handle;
        self
    }

    pub fn session_state(&self) -> SessionState {
        SessionState::new(
            self.jwt_manager.clone(),
            self.cookie_key.clone(),
            self.config.cookie.strip_prefixes.clone(),
            self.config.cookie.remember_days,
        )
    }

    pub fn auth_state(&self) -> AuthMiddlewareState {
        AuthMiddlewareState::new(
            self.jwt_manager.clone(),
            self.config.jwt.override_authorization.clone(),
        )
    }

    pub fn error_state(&self) -> ErrorTranslationState {
        ErrorTranslationState::new(
            self.config.expose_stack_traces(),
            self.request_log.clone(),
            self.notifier.clone(),
            self.config.notify.recipient.clone(),
        )
    }

    pub fn ssl_config(&self) -> SslConfig {
        self.config.ssl
    }
}

/// Signing key for the session cookie.
///
/// Without a configured key one is generated, so sessions do not survive a
/// restart.
fn cookie_key(configured: Option<&[u8]>) -> Result<Key> {
    match configured {
        Some(bytes) => Key::try_from(bytes).context("Invalid COOKIE_KEY"),
        None => {
            tracing::warn!("COOKIE_KEY not set, generating an ephemeral cookie signing key");
            Ok(Key::generate())
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
