//! JWT token handling
//!
//! [`verify`] is the credential verifier shared by the cookie session and
//! bearer middleware. It is pure: the result depends only on the token, the
//! secret and the clock. [`JwtManager`] wraps it with the configured secret
//! and mints/reissues tokens.

use crate::config::JwtConfig;
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default token lifetime (24 hours)
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Compact role code carried in tokens.
///
/// Unknown codes fail deserialization, so a token with a code outside this
/// set never verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleCode {
    #[serde(rename = "g")]
    Guest,
    #[serde(rename = "a")]
    Admin,
    #[serde(rename = "s")]
    Superuser,
}

impl RoleCode {
    /// Expand to the canonical role exposed to handlers
    pub fn role(self) -> Role {
        match self {
            RoleCode::Guest => Role::Guest,
            RoleCode::Admin => Role::Admin,
            RoleCode::Superuser => Role::Superuser,
        }
    }

    /// Code for a stored role name ("Admin", "guest", "su", ...), matched on
    /// its first letter.
    pub fn from_role_name(name: &str) -> Option<Self> {
        match name.trim().chars().next()?.to_ascii_lowercase() {
            'g' => Some(RoleCode::Guest),
            'a' => Some(RoleCode::Admin),
            's' => Some(RoleCode::Superuser),
            _ => None,
        }
    }
}

/// Canonical role name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "guest")]
    Guest,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "su")]
    Superuser,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Admin => "admin",
            Role::Superuser => "su",
        }
    }

    /// Admins and superusers may manage other users
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::Superuser)
    }
}

/// Verified token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Subject (user ID)
    pub sub: String,
    /// Compact role code
    pub role: RoleCode,
    /// Session may be extended past a single token lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl ClaimSet {
    pub fn remembers(&self) -> bool {
        self.remember.unwrap_or(false)
    }
}

/// Verification options
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Accept tokens whose `exp` has passed
    pub ignore_expiration: bool,
}

impl VerifyOptions {
    pub fn ignoring_expiration() -> Self {
        Self {
            ignore_expiration: true,
        }
    }
}

/// Classified verification failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Malformed, mis-signed or otherwise untrustworthy token
    #[error("Invalid token")]
    InvalidToken,
    /// Well-formed and correctly signed, but past `exp`
    #[error("Token expired")]
    Expired,
    /// No signing secret configured
    #[error("No JWT secret key available")]
    MissingSecret,
    /// Any other verification failure
    #[error("Token verification failed: {0}")]
    Other(String),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingAlgorithm
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => VerifyError::InvalidToken,
            _ => VerifyError::Other(err.to_string()),
        }
    }
}

/// No leeway: a token is expired the second after `exp`.
fn validation(options: VerifyOptions) -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.leeway = 0;
    v.validate_exp = !options.ignore_expiration;
    v.validate_aud = false;
    v.set_required_spec_claims(&["exp", "sub"]);
    v
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    options: VerifyOptions,
) -> std::result::Result<ClaimSet, VerifyError> {
    let data = decode::<ClaimSet>(token, key, &validation(options))?;
    Ok(data.claims)
}

/// Verify a compact token against a secret.
pub fn verify(
    token: &str,
    secret: &str,
    options: VerifyOptions,
) -> std::result::Result<ClaimSet, VerifyError> {
    decode_claims(token, &DecodingKey::from_secret(secret.as_bytes()), options)
}

/// Sign a claim set as an HS256 token.
pub fn sign(claims: &ClaimSet, secret: &str) -> Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.into()))
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// JWT token manager bound to the configured secret
#[derive(Clone)]
pub struct JwtManager {
    keys: Option<SigningKeys>,
    token_ttl_secs: i64,
}

impl JwtManager {
    pub fn new(config: &JwtConfig) -> Self {
        let keys = config.secret.as_ref().map(|secret| SigningKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        });
        Self {
            keys,
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    pub fn has_secret(&self) -> bool {
        self.keys.is_some()
    }

    pub fn token_ttl_secs(&self) -> i64 {
        self.token_ttl_secs
    }

    /// Verify a token with the configured secret
    pub fn verify(
        &self,
        token: &str,
        options: VerifyOptions,
    ) -> std::result::Result<ClaimSet, VerifyError> {
        let keys = self.keys.as_ref().ok_or(VerifyError::MissingSecret)?;
        decode_claims(token, &keys.decoding, options)
    }

    fn encode(&self, claims: &ClaimSet) -> Result<String> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!(VerifyError::MissingSecret)))?;
        encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
            .map_err(|e| AppError::Internal(e.into()))
    }

    /// Issue a fresh token for a principal
    pub fn issue(&self, sub: &str, role: RoleCode, remember: Option<bool>) -> Result<String> {
        let now = Utc::now();
        let claims = ClaimSet {
            sub: sub.to_string(),
            role,
            remember,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.token_ttl_secs)).timestamp(),
        };
        self.encode(&claims)
    }

    /// Replacement for an expired token: same claims, restamped with a full
    /// lifetime from now.
    pub fn reissue(&self, claims: &ClaimSet) -> Result<(String, ClaimSet)> {
        let now = Utc::now();
        let renewed = ClaimSet {
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.token_ttl_secs)).timestamp(),
            ..claims.clone()
        };
        let token = self.encode(&renewed)?;
        Ok((token, renewed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-for-testing-purposes-only";

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: Some(SECRET.to_string()),
            override_authorization: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }

    fn claims_expiring_in(secs: i64, remember: Option<bool>) -> ClaimSet {
        let now = Utc::now().timestamp();
        ClaimSet {
            sub: "42".to_string(),
            role: RoleCode::Admin,
            remember,
            iat: now - DEFAULT_TOKEN_TTL_SECS,
            exp: now + secs,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let manager = JwtManager::new(&test_config());
        let token = manager.issue("42", RoleCode::Guest, None).unwrap();

        let claims = manager.verify(&token, VerifyOptions::default()).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, RoleCode::Guest);
        assert_eq!(claims.remember, None);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_expired_token() {
        let token = sign(&claims_expiring_in(-60, None), SECRET).unwrap();

        let result = verify(&token, SECRET, VerifyOptions::default());
        assert_eq!(result, Err(VerifyError::Expired));
    }

    #[test]
    fn test_expired_token_with_ignore_expiration() {
        let claims = claims_expiring_in(-3600, Some(true));
        let token = sign(&claims, SECRET).unwrap();

        let verified = verify(&token, SECRET, VerifyOptions::ignoring_expiration()).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = sign(&claims_expiring_in(3600, None), SECRET).unwrap();

        let result = verify(&token, "another-secret", VerifyOptions::default());
        assert_eq!(result, Err(VerifyError::InvalidToken));
    }

    #[test]
    fn test_expired_and_mis_signed_is_invalid_not_expired() {
        let token = sign(&claims_expiring_in(-3600, None), SECRET).unwrap();

        let result = verify(&token, "another-secret", VerifyOptions::ignoring_expiration());
        assert_eq!(result, Err(VerifyError::InvalidToken));
    }

    #[test]
    fn test_malformed_tokens_are_invalid() {
        for token in ["invalid-token", "a.b.c", "", "eyJhbGciOiJIUzI1NiJ9.e30"] {
            let result = verify(token, SECRET, VerifyOptions::default());
            assert_eq!(result, Err(VerifyError::InvalidToken), "token {token:?}");
        }
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let token = sign(&claims_expiring_in(3600, None), SECRET).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = sign(
            &ClaimSet {
                role: RoleCode::Superuser,
                ..claims_expiring_in(3600, None)
            },
            SECRET,
        )
        .unwrap();
        let forged_payload = forged.split('.').nth(1).unwrap().to_string();
        parts[1] = &forged_payload;
        parts[2] = "AAAA";

        let result = verify(&parts.join("."), SECRET, VerifyOptions::default());
        assert_eq!(result, Err(VerifyError::InvalidToken));
    }

    #[test]
    fn test_unknown_role_code_fails_closed() {
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({
            "sub": "42",
            "role": "x",
            "iat": now,
            "exp": now + 3600,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let result = verify(&token, SECRET, VerifyOptions::default());
        assert_eq!(result, Err(VerifyError::InvalidToken));
    }

    #[test]
    fn test_missing_secret() {
        let manager = JwtManager::new(&JwtConfig {
            secret: None,
            ..test_config()
        });

        assert!(!manager.has_secret());
        assert_eq!(
            manager.verify("a.b.c", VerifyOptions::default()),
            Err(VerifyError::MissingSecret)
        );
        assert!(manager.issue("1", RoleCode::Guest, None).is_err());
    }

    #[test]
    fn test_reissue_keeps_claims_and_renews_expiry() {
        let manager = JwtManager::new(&test_config());
        let old = claims_expiring_in(-600, Some(true));

        let (token, renewed) = manager.reissue(&old).unwrap();
        let now = Utc::now().timestamp();

        assert_eq!(renewed.sub, old.sub);
        assert_eq!(renewed.role, old.role);
        assert_eq!(renewed.remember, Some(true));
        assert!((renewed.exp - (now + DEFAULT_TOKEN_TTL_SECS)).abs() <= 2);
        assert_eq!(manager.verify(&token, VerifyOptions::default()).unwrap(), renewed);
    }

    #[test]
    fn test_role_expansion() {
        assert_eq!(RoleCode::Guest.role(), Role::Guest);
        assert_eq!(RoleCode::Admin.role().as_str(), "admin");
        assert_eq!(RoleCode::Superuser.role().as_str(), "su");
        assert!(Role::Superuser.is_admin());
        assert!(!Role::Guest.is_admin());
    }

    #[test]
    fn test_role_code_from_stored_name() {
        assert_eq!(RoleCode::from_role_name("Admin"), Some(RoleCode::Admin));
        assert_eq!(RoleCode::from_role_name("guest"), Some(RoleCode::Guest));
        assert_eq!(RoleCode::from_role_name("Su"), Some(RoleCode::Superuser));
        assert_eq!(RoleCode::from_role_name("owner"), None);
        assert_eq!(RoleCode::from_role_name(""), None);
    }

    #[test]
    fn test_claims_serialization_omits_missing_remember() {
        let claims = ClaimSet {
            sub: "7".to_string(),
            role: RoleCode::Guest,
            remember: None,
            iat: 1000000,
            exp: 1086400,
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"role\":\"g\""));
        assert!(!json.contains("remember"));
    }
}
