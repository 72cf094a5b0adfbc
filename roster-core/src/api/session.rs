//! Browser session login and logout

use crate::api::verify_login;
use crate::domain::{Envelope, LoginRequest};
use crate::error::Result;
use crate::middleware::session::{host_of, removal_cookie, session_cookie};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    Json,
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde_json::json;

const ROOT: &str = "session";

/// POST /session - check credentials and set the session cookie.
///
/// With `remember` the cookie outlives the browser session.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: SignedCookieJar,
    Json(login): Json<LoginRequest>,
) -> Result<(SignedCookieJar, Envelope)> {
    let (user, role) = verify_login(&state, &login, "session").await?;
    let token = state.jwt_manager.issue(
        &user.id.to_string(),
        role,
        login.remember.then_some(true),
    )?;

    let session = state.session_state();
    let domain = session.domain_for(host_of(&headers, &uri).as_deref());
    let expires = login.remember.then(|| session.remember_until());
    let jar = jar.add(session_cookie(token, domain, expires));

    tracing::info!(user_id = user.id, remember = login.remember, "Session started");
    let envelope = Envelope::new(
        ROOT,
        json!({ "user": { "id": user.id, "role": role.role().as_str() } }),
    );
    Ok((jar, envelope))
}

/// DELETE /session - clear the session cookie
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: SignedCookieJar,
) -> (SignedCookieJar, StatusCode) {
    let domain = state
        .session_state()
        .domain_for(host_of(&headers, &uri).as_deref());
    (jar.remove(removal_cookie(domain)), StatusCode::NO_CONTENT)
}
