//! User API handlers

use crate::domain::{CreateUserInput, Envelope};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

const ROOT: &str = "user";

/// POST /users - admins and superusers only
pub async fn create(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Json(input): Json<CreateUserInput>,
) -> Result<Response> {
    auth.require_admin()?;

    let user = state.user_service.create(input).await?;
    let location = HeaderValue::from_str(&format!("/users/{}", user.id))
        .map_err(|e| AppError::Internal(e.into()))?;

    let envelope = Envelope::from_serialize(ROOT, &user)?;
    let mut response = (StatusCode::CREATED, envelope).into_response();
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}

/// GET /users/{id}
pub async fn get(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Envelope> {
    let user = state.user_service.get(id).await?;
    Envelope::from_serialize(ROOT, &user)
}

/// DELETE /users/{id} - admins and superusers only
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    auth.require_admin()?;
    state.user_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
