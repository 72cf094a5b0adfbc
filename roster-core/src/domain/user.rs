//! User domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::jwt::RoleCode;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub phone: Option<String>,
    /// Stored role name ("guest", "admin", "su")
    pub role: String,
    /// Argon2 PHC string
    #[serde(skip)]
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Compact role code for tokens. Unknown stored roles get no code.
    pub fn role_code(&self) -> Option<RoleCode> {
        RoleCode::from_role_name(&self.role)
    }
}

fn validate_role(role: &str) -> Result<(), ValidationError> {
    match RoleCode::from_role_name(role) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("role")),
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    #[serde(alias = "email")]
    #[validate(email)]
    pub user_name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[validate(custom(function = "validate_role"))]
    pub role: String,
    #[validate(length(max = 255))]
    pub firstname: Option<String>,
    #[validate(length(max = 255))]
    pub lastname: Option<String>,
}

/// Row values for an insert, password already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub role: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// Credentials for `POST /auth` and `POST /session`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub user_name: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    /// Keep the browser session alive past one token lifetime
    #[serde(default)]
    pub remember: bool,
}
