//! Server initialization and routing

pub mod pipeline;

use crate::api;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware::{
    cookie_session_middleware, require_auth_middleware, RedactingMakeSpan,
};
use crate::migration;
use crate::notify;
use crate::repository::MySqlUserRepository;
use crate::request_log::CappedRequestLog;
use anyhow::Result;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub use crate::state::AppState;

/// Run the HTTP server until a shutdown signal arrives
pub async fn run(config: Config, metrics_handle: Option<PrometheusHandle>) -> Result<()> {
    migration::run_migrations(&config).await?;

    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    info!("Connected to database");

    let user_repo = Arc::new(MySqlUserRepository::new(db_pool));
    let request_log = Arc::new(CappedRequestLog::new(config.environment));
    let notifier = notify::from_config(&config.notify)?;

    let http_addr = config.http_addr();
    let state =
        AppState::new(config, user_repo, request_log, notifier)?.with_metrics(metrics_handle);
    let app = build_router(state);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Build the HTTP router.
///
/// Browser routes get the optional cookie session, API routes require a
/// bearer token; both then run through the shared [`pipeline`].
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let unsecured = Router::new()
        .route("/", get(api::root::get_root))
        .route("/auth", post(api::auth::login))
        .route(
            "/session",
            post(api::session::login).delete(api::session::logout),
        )
        .route_layer(from_fn_with_state(
            state.session_state(),
            cookie_session_middleware,
        ));

    // Unknown paths fall in here, so they need a token before a 404
    let secured = Router::new()
        .route("/users", post(api::user::create))
        .route(
            "/users/{id}",
            get(api::user::get).delete(api::user::delete),
        )
        .fallback(not_found)
        .layer(from_fn_with_state(
            state.auth_state(),
            require_auth_middleware,
        ));

    let bare = Router::new()
        .route("/health", get(api::health::health))
        .route("/metrics", get(api::health::metrics));

    let app = bare
        .merge(unsecured)
        .merge(secured)
        .with_state(state.clone());

    pipeline::apply(app, &state)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(RedactingMakeSpan))
}

async fn not_found() -> AppError {
    AppError::NotFound("Not found".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}
