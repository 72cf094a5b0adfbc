//! User business logic

use crate::domain::{CreateUserInput, LoginRequest, NewUser, User};
use crate::error::{AppError, Result};
use crate::jwt::RoleCode;
use crate::repository::UserRepository;
use crate::service::password::{hash_password, verify_password};
use std::sync::{Arc, OnceLock};
use validator::Validate;

const CREDENTIALS_NOT_FOUND: &str = "Username/password not found";

/// Hash checked against when the user is unknown, so a miss costs the
/// same as a wrong password.
fn placeholder_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("placeholder-password").unwrap_or_default())
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Check login credentials.
    ///
    /// Unknown users and wrong passwords are indistinguishable to callers.
    pub async fn authenticate(&self, login: &LoginRequest) -> Result<User> {
        login.validate()?;

        let user = self.repo.find_by_email(login.user_name.trim()).await?;
        let hash = user
            .as_ref()
            .map(|u| u.password.as_str())
            .unwrap_or_else(|| placeholder_hash());

        let matches = verify_password(&login.password, hash);
        match user {
            Some(user) if matches => Ok(user),
            _ => Err(AppError::NotFound(CREDENTIALS_NOT_FOUND.to_string())),
        }
    }

    pub async fn create(&self, input: CreateUserInput) -> Result<User> {
        input.validate()?;
        let role = RoleCode::from_role_name(&input.role)
            .ok_or_else(|| AppError::Validation(format!("role: unknown role {}", input.role)))?
            .role();

        let new_user = NewUser {
            email: input.user_name.trim().to_string(),
            password_hash: hash_password(&input.password)?,
            phone: input.phone,
            role: role.as_str().to_string(),
            firstname: input.firstname,
            lastname: input.lastname,
        };

        let user = self.repo.create(&new_user).await?;
        tracing::info!(user_id = user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn get(&self, id: u64) -> Result<User> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        if !self.repo.delete(id).await? {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::user::MockUserRepository;
    use chrono::Utc;
    use mockall::predicate::*;

    fn stored_user(password: &str) -> User {
        User {
            id: 7,
            email: "ada@example.com".to_string(),
            firstname: Some("Ada".to_string()),
            lastname: None,
            phone: Some("0123".to_string()),
            role: "admin".to_string(),
            password: hash_password(password).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn login(password: &str) -> LoginRequest {
        LoginRequest {
            user_name: "ada@example.com".to_string(),
            password: password.to_string(),
            remember: false,
        }
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let mut mock = MockUserRepository::new();
        let user = stored_user("secret-pass");
        mock.expect_find_by_email()
            .withf(|email| email == "ada@example.com")
            .returning(move |_| Ok(Some(user.clone())));

        let service = UserService::new(Arc::new(mock));
        let user = service.authenticate(&login("secret-pass")).await.unwrap();
        assert_eq!(user.id, 7);
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password_is_not_found() {
        let mut mock = MockUserRepository::new();
        let user = stored_user("secret-pass");
        mock.expect_find_by_email()
            .returning(move |_| Ok(Some(user.clone())));

        let service = UserService::new(Arc::new(mock));
        let err = service.authenticate(&login("wrong")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == CREDENTIALS_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user_is_not_found() {
        let mut mock = MockUserRepository::new();
        mock.expect_find_by_email().returning(|_| Ok(None));

        let service = UserService::new(Arc::new(mock));
        let err = service.authenticate(&login("anything")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_empty_credentials() {
        let mut mock = MockUserRepository::new();
        mock.expect_find_by_email().never();

        let service = UserService::new(Arc::new(mock));
        let err = service.authenticate(&login("")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_hashes_password_and_normalizes_role() {
        let mut mock = MockUserRepository::new();
        mock.expect_create()
            .withf(|new_user| {
                new_user.role == "admin"
                    && new_user.password_hash.starts_with("$argon2")
                    && verify_password("long enough", &new_user.password_hash)
            })
            .returning(|new_user| {
                Ok(User {
                    id: 11,
                    email: new_user.email.clone(),
                    firstname: None,
                    lastname: None,
                    phone: Some(new_user.phone.clone()),
                    role: new_user.role.clone(),
                    password: new_user.password_hash.clone(),
                    created_at: Utc::now(),
                })
            });

        let service = UserService::new(Arc::new(mock));
        let user = service
            .create(CreateUserInput {
                user_name: "new@example.com".to_string(),
                password: "long enough".to_string(),
                phone: "555".to_string(),
                role: "Admin".to_string(),
                firstname: None,
                lastname: None,
            })
            .await
            .unwrap();

        assert_eq!(user.id, 11);
    }

    #[tokio::test]
    async fn test_create_invalid_input() {
        let mut mock = MockUserRepository::new();
        mock.expect_create().never();

        let service = UserService::new(Arc::new(mock));
        let result = service
            .create(CreateUserInput {
                user_name: "not-an-email".to_string(),
                password: "long enough".to_string(),
                phone: "555".to_string(),
                role: "guest".to_string(),
                firstname: None,
                lastname: None,
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let mut mock = MockUserRepository::new();
        mock.expect_find_by_id().with(eq(99)).returning(|_| Ok(None));

        let service = UserService::new(Arc::new(mock));
        assert!(matches!(service.get(99).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let mut mock = MockUserRepository::new();
        mock.expect_delete().with(eq(7)).returning(|_| Ok(true));
        mock.expect_delete().with(eq(8)).returning(|_| Ok(false));

        let service = UserService::new(Arc::new(mock));
        assert!(service.delete(7).await.is_ok());
        assert!(matches!(service.delete(8).await, Err(AppError::NotFound(_))));
    }
}
