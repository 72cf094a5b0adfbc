//! Configuration management for Roster Core

use anyhow::{bail, Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Database configuration
    pub database: DatabaseConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Session cookie configuration
    pub cookie: CookieConfig,
    /// SSL enforcement configuration
    pub ssl: SslConfig,
    /// 500-error notification configuration
    pub notify: NotifyConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

/// Deployment environment.
///
/// Controls SSL bypass, stack trace exposure and request log persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            other => bail!("Invalid APP_ENV: {other}"),
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Test => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct JwtConfig {
    /// Token signing secret. Missing secrets are reported per request,
    /// not at startup.
    pub secret: Option<String>,
    /// Authorization header value used when an API request carries none
    /// (trusted service-to-service calls).
    pub override_authorization: Option<String>,
    /// Lifetime of issued and refreshed tokens
    pub token_ttl_secs: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field(
                "override_authorization",
                &self.override_authorization.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct CookieConfig {
    /// Key material for cookie signatures (at least 64 bytes).
    /// `None` means a random key is generated at startup.
    pub key: Option<Vec<u8>>,
    /// Subdomain prefixes stripped from the request host to form the
    /// cookie domain
    pub strip_prefixes: Vec<String>,
    /// Outer cookie lifetime for remembered sessions
    pub remember_days: i64,
}

impl std::fmt::Debug for CookieConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("strip_prefixes", &self.strip_prefixes)
            .field("remember_days", &self.remember_days)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SslConfig {
    /// Let every request through regardless of transport
    pub disabled: bool,
    /// Honor `X-Forwarded-Proto` from a terminating proxy
    pub trust_proxy: bool,
}

impl SslConfig {
    /// Default for an environment: enforced only in production.
    ///
    /// The server listens on plain TCP and only ever sees origin-form URIs,
    /// so TLS is expected to terminate at a proxy that sets
    /// `X-Forwarded-Proto`.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            disabled: !environment.is_production(),
            trust_proxy: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub recipient: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: false,
        }
    }
}

pub const DEFAULT_STRIP_PREFIXES: &[&str] = &["admin.", "assessment."];

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let environment = match non_empty("APP_ENV") {
            Some(value) => Environment::parse(&value)?,
            None => Environment::Development,
        };

        let cookie_key = match non_empty("COOKIE_KEY") {
            Some(key) if key.len() < 64 => {
                bail!("COOKIE_KEY must be at least 64 bytes")
            }
            Some(key) => Some(key.into_bytes()),
            None => None,
        };

        let ssl_defaults = SslConfig::for_environment(environment);

        let smtp = match non_empty("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .context("Invalid SMTP_PORT")?,
                username: non_empty("SMTP_USERNAME"),
                password: non_empty("SMTP_PASSWORD"),
                from: env::var("SMTP_FROM").unwrap_or_else(|_| "roster@localhost".to_string()),
            }),
            None => None,
        };

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            environment,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            jwt: JwtConfig {
                secret: non_empty("JWT_SECRET_KEY"),
                override_authorization: non_empty("JWT_OVERRIDE_AUTHORIZATION"),
                token_ttl_secs: env::var("JWT_TTL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
            },
            cookie: CookieConfig {
                key: cookie_key,
                strip_prefixes: non_empty("COOKIE_STRIP_PREFIXES")
                    .map(|s| {
                        s.split(',')
                            .map(|p| p.trim().to_string())
                            .filter(|p| !p.is_empty())
                            .collect()
                    })
                    .unwrap_or_else(|| {
                        DEFAULT_STRIP_PREFIXES.iter().map(|p| p.to_string()).collect()
                    }),
                remember_days: env::var("SESSION_REMEMBER_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .unwrap_or(7),
            },
            ssl: SslConfig {
                disabled: env_flag("SSL_DISABLED").unwrap_or(ssl_defaults.disabled),
                trust_proxy: env_flag("SSL_TRUST_PROXY").unwrap_or(ssl_defaults.trust_proxy),
            },
            notify: NotifyConfig {
                recipient: non_empty("NOTIFY_RECIPIENT"),
                smtp,
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
                metrics_enabled: env_flag("METRICS_ENABLED").unwrap_or(false),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Whether diagnostic traces may be sent to clients
    pub fn expose_stack_traces(&self) -> bool {
        !self.environment.is_production()
    }

    /// Configuration suitable for tests: no database, SSL off, known secret.
    pub fn for_tests(secret: &str) -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            environment: Environment::Test,
            database: DatabaseConfig {
                url: "mysql://localhost/roster_test".to_string(),
                max_connections: 1,
            },
            jwt: JwtConfig {
                secret: Some(secret.to_string()),
                override_authorization: None,
                token_ttl_secs: 86400,
            },
            cookie: CookieConfig {
                key: None,
                strip_prefixes: DEFAULT_STRIP_PREFIXES.iter().map(|p| p.to_string()).collect(),
                remember_days: 7,
            },
            ssl: SslConfig::for_environment(Environment::Test),
            notify: NotifyConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
