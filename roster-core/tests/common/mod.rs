//! Common test utilities
//!
//! The production router over in-memory collaborators: no database, no
//! SMTP relay. Requests go through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::SET_COOKIE, Request},
    response::{IntoResponse, Response},
    Router,
};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use chrono::Utc;
use roster_core::config::Config;
use roster_core::domain::{NewUser, User};
use roster_core::error::{Failure, Result};
use roster_core::jwt::{sign, ClaimSet, RoleCode};
use roster_core::notify::{Notifier, NotifyError};
use roster_core::repository::UserRepository;
use roster_core::request_log::{RequestDescriptor, RequestLogger};
use roster_core::server::{build_router, AppState};
use roster_core::service::password::hash_password;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret-key-for-roster";
pub const COOKIE_KEY: [u8; 64] = [42; 64];
pub const NOTIFY_RECIPIENT: &str = "ops@example.com";

// ============================================================================
// In-memory collaborators
// ============================================================================

pub struct TestUserRepository {
    users: RwLock<Vec<User>>,
    next_id: AtomicU64,
}

impl TestUserRepository {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(vec![]),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for TestUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for TestUserRepository {
    async fn create(&self, input: &NewUser) -> Result<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == input.email) {
            return Err(roster_core::AppError::Conflict(format!(
                "User {} already exists",
                input.email
            )));
        }

        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: input.email.clone(),
            firstname: input.firstname.clone(),
            lastname: input.lastname.clone(),
            phone: Some(input.phone.clone()),
            role: input.role.clone(),
            password: input.password_hash.clone(),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() != before)
    }
}

/// Request logger that remembers what it was told
#[derive(Default)]
pub struct RecordingLog {
    pub access: Mutex<Vec<RequestDescriptor>>,
    pub errors: Mutex<Vec<(RequestDescriptor, Failure)>>,
}

#[async_trait]
impl RequestLogger for RecordingLog {
    async fn access(&self, request: &RequestDescriptor, _duration: Duration) -> anyhow::Result<()> {
        self.access.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn error(&self, request: &RequestDescriptor, failure: &Failure) -> anyhow::Result<()> {
        self.errors
            .lock()
            .unwrap()
            .push((request.clone(), failure.clone()));
        Ok(())
    }
}

/// Notifier that records subjects and recipients
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
        _request: &RequestDescriptor,
    ) -> std::result::Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

// ============================================================================
// Test application
// ============================================================================

pub fn test_config() -> Config {
    let mut config = Config::for_tests(SECRET);
    config.cookie.key = Some(COOKIE_KEY.to_vec());
    config.notify.recipient = Some(NOTIFY_RECIPIENT.to_string());
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<TestUserRepository>,
    pub log: Arc<RecordingLog>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let users = Arc::new(TestUserRepository::new());
        let log = Arc::new(RecordingLog::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::new(config, users.clone(), log.clone(), notifier.clone())
            .expect("Failed to build test state");
        let router = build_router(state.clone());

        Self {
            router,
            state,
            users,
            log,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn seed_user(&self, email: &str, password: &str, role: &str) -> User {
        self.users
            .create(&NewUser {
                email: email.to_string(),
                password_hash: hash_password(password).unwrap(),
                phone: "555-0100".to_string(),
                role: role.to_string(),
                firstname: None,
                lastname: None,
            })
            .await
            .unwrap()
    }

    pub fn token(&self, sub: &str, role: RoleCode) -> String {
        self.state.jwt_manager.issue(sub, role, None).unwrap()
    }

    pub fn key(&self) -> Key {
        Key::from(&COOKIE_KEY)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tokens, cookies and bodies
// ============================================================================

/// Token whose `exp` passed an hour ago
pub fn expired_token(sub: &str, role: RoleCode, remember: Option<bool>) -> String {
    let now = Utc::now().timestamp();
    sign(
        &ClaimSet {
            sub: sub.to_string(),
            role,
            remember,
            iat: now - 90_000,
            exp: now - 3_600,
        },
        SECRET,
    )
    .unwrap()
}

/// `Cookie` request header value carrying `token` signed with `key`
pub fn signed_session_cookie(key: &Key, token: &str) -> String {
    let jar = SignedCookieJar::new(key.clone()).add(Cookie::new("session-jwt", token.to_string()));
    let response = (jar, ()).into_response();
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    set_cookie.split(';').next().unwrap().to_string()
}

/// The session `Set-Cookie` header of a response, if any
pub fn session_set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session-jwt="))
        .map(String::from)
}

/// Token inside a session `Set-Cookie` value, signature verified with `key`
pub fn token_from_set_cookie(key: &Key, set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?;
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(axum::http::header::COOKIE, pair.parse().ok()?);
    SignedCookieJar::from_headers(&headers, key.clone())
        .get("session-jwt")
        .map(|c| c.value().to_string())
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}
