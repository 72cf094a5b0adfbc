//! HTTP middleware for Roster Core
//!
//! The request pipeline, outermost first:
//! - error translation (uniform error bodies, request logging, 5xx notices)
//! - response timing and request IDs
//! - SSL enforcement
//! - content negotiation
//! - cookie session (browser routes) or bearer auth (API routes)

pub mod auth;
pub mod error_response;
pub mod negotiate;
pub mod require_auth;
pub mod response_time;
pub mod session;
pub mod ssl;
pub mod trace;

pub use auth::{AuthUser, Principal, SessionUser};
pub use error_response::{error_translation_middleware, ErrorTranslationState};
pub use negotiate::negotiate_middleware;
pub use require_auth::{require_auth_middleware, AuthMiddlewareState};
pub use response_time::ResponseTimeLayer;
pub use session::{cookie_session_middleware, SessionState};
pub use ssl::ssl_middleware;
pub use trace::RedactingMakeSpan;
