//! REST API handlers and the helpers they share

pub mod auth;
pub mod health;
pub mod root;
pub mod session;
pub mod user;

use crate::domain::{LoginRequest, User};
use crate::error::{AppError, Result};
use crate::jwt::RoleCode;
use crate::state::AppState;

/// Check login credentials and resolve the role code carried by tokens.
///
/// Users whose stored role has no code cannot log in.
pub(crate) async fn verify_login(
    state: &AppState,
    login: &LoginRequest,
    flow: &'static str,
) -> Result<(User, RoleCode)> {
    let user = match state.user_service.authenticate(login).await {
        Ok(user) => user,
        Err(e) => {
            metrics::counter!("roster_auth_login_total", "flow" => flow, "result" => "failure")
                .increment(1);
            return Err(e);
        }
    };

    let role = user.role_code().ok_or_else(|| {
        tracing::warn!(user_id = user.id, role = %user.role, "User has an unknown role");
        AppError::Forbidden("Unrecognised role".to_string())
    })?;

    metrics::counter!("roster_auth_login_total", "flow" => flow, "result" => "success")
        .increment(1);
    Ok((user, role))
}
