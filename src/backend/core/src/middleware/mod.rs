//! Request middleware for Civica Core.
pub mod auth;

pub use auth::{AuthLayer, AuthService, Authenticator, IdentityClaims};
