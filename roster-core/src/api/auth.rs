//! Token login for API clients

use crate::api::verify_login;
use crate::domain::{Envelope, LoginRequest};
use crate::error::Result;
use crate::state::AppState;
use axum::{extract::State, Json};

const ROOT: &str = "auth";

/// POST /auth - exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(login): Json<LoginRequest>,
) -> Result<Envelope> {
    let (user, role) = verify_login(&state, &login, "token").await?;
    let token = state
        .jwt_manager
        .issue(&user.id.to_string(), role, None)?;

    tracing::info!(user_id = user.id, "Issued API token");
    Envelope::data(ROOT, &token)
}
