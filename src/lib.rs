//! # Storefront
//!
//! Backend for a small online shop.
//!
//! ## Features
//!
//! - **Sessions**: local registration and login, GitHub sign-in, JWT cookie sessions
//! - **Authorization**: strategy dispatch middleware and a role guard
//! - **Carts**: per-user carts, a product catalogue and purchase tickets
//! - **Server**: axum HTTP server exposing the whole API
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront::{
//!     auth::{JwtConfig, JwtManager, OAuthConfig, OAuthManager, StrategyRegistry, UserDatabase},
//!     cart::{CartDatabase, CartService},
//!     db::Database,
//!     servers::{WebConfig, WebServer},
//! };
//!
//! # async fn run() -> storefront::Result<()> {
//! let db = Database::in_memory().map_err(storefront::db::StoreError::from)?;
//! let users = UserDatabase::new(db.clone())?;
//! let carts = CartService::new(CartDatabase::new(db)?, users.clone());
//! let registry = StrategyRegistry::new(
//!     users,
//!     JwtManager::new(JwtConfig::from_env()),
//!     OAuthManager::new(OAuthConfig::from_env()),
//! );
//! WebServer::new(WebConfig::default(), Arc::new(registry), carts).start().await
//! # }
//! ```

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Identities, strategies, sessions and the role guard
pub mod auth;

/// Carts, products and tickets
pub mod cart;

/// Shared SQLite handle
pub mod db;

/// Logger setup
pub mod logging;

/// HTTP server
pub mod servers;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use servers::{WebConfig, WebServer};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Top-level error for starting and running the service
#[derive(Debug, thiserror::Error)]
pub enum StorefrontError {
    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] db::StoreError),

    #[error("Logging error: {0}")]
    Logging(#[from] flexi_logger::FlexiLoggerError),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StorefrontError>;

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
