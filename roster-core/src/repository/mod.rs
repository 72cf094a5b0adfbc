//! Data access layer (Repository pattern)

pub mod user;

pub use user::{MySqlUserRepository, UserRepository};
