//! Shopping carts, the product catalogue and purchase tickets

pub mod database;
pub mod error;
pub mod models;
pub mod routes;
pub mod service;

pub use database::CartDatabase;
pub use error::CartError;
pub use models::*;
pub use routes::{cart_router, product_router};
pub use service::CartService;
