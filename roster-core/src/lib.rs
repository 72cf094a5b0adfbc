//! Roster Core - REST API backend
//!
//! Users behind JWT authentication: a signed cookie
//! session for browser routes, bearer tokens for the API, and responses
//! negotiated as JSON, XML or YAML.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod migration;
pub mod negotiate;
pub mod notify;
pub mod repository;
pub mod request_log;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
