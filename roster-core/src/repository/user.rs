//! User repository

use crate::domain::{NewUser, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser) -> Result<User>;
    async fn find_by_id(&self, id: u64) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Returns `false` when no row matched
    async fn delete(&self, id: u64) -> Result<bool>;
}

pub struct MySqlUserRepository {
    pool: MySqlPool,
}

impl MySqlUserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for MySqlUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password, phone, role, firstname, lastname, created_at)
            VALUES (?, ?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(&user.role)
        .bind(&user.firstname)
        .bind(&user.lastname)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create user")))
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, firstname, lastname, phone, role, password, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, firstname, lastname, phone, role, password, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
