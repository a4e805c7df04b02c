//! Authentication module
//!
//! Provides:
//! - Local registration and login with argon2 password hashes
//! - GitHub OAuth login with identity provisioning
//! - JWT sessions carried in the `jwt` cookie
//! - Strategy dispatch middleware and the role guard built on it

pub mod database;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod guard;
pub mod jwt;
pub mod models;
pub mod oauth;
pub mod password;
pub mod routes;
pub mod strategy;

pub use database::UserDatabase;
pub use dispatch::{authenticate, passport_call, PassportCall};
pub use error::AuthError;
pub use extract::{TokenExtractor, TokenSource};
pub use guard::authorization;
pub use jwt::{JwtConfig, JwtManager};
pub use models::*;
pub use oauth::{OAuthConfig, OAuthManager};
pub use routes::auth_router;
pub use strategy::{AuthRequest, Authenticator, Outcome, Strategy, StrategyRegistry};
