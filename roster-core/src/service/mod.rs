//! Business logic layer

pub mod password;
pub mod user;

pub use user::UserService;
