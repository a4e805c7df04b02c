use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::error::error_response;
use crate::db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Cart not found")]
    CartNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Product not in cart")]
    ItemNotFound,

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Invalid product: {0}")]
    InvalidProduct(&'static str),

    #[error("Invalid request body")]
    InvalidBody,

    #[error("Product code already exists")]
    DuplicateCode,

    #[error("Purchase total too large")]
    TotalTooLarge,

    #[error("Unknown purchaser")]
    UnknownPurchaser,

    #[error("No products with enough stock")]
    NothingPurchasable(Vec<String>),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CartError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateCode => CartError::DuplicateCode,
            StoreError::QuantityOverflow => CartError::InvalidQuantity,
            StoreError::AmountOverflow => CartError::TotalTooLarge,
            other => CartError::Store(other),
        }
    }
}

impl IntoResponse for CartError {
    fn into_response(self) -> Response {
        match self {
            CartError::CartNotFound | CartError::ProductNotFound | CartError::ItemNotFound => {
                error_response(StatusCode::NOT_FOUND, &self.to_string())
            }
            CartError::InvalidQuantity
            | CartError::InvalidProduct(_)
            | CartError::InvalidBody
            | CartError::TotalTooLarge => {
                error_response(StatusCode::BAD_REQUEST, &self.to_string())
            }
            CartError::DuplicateCode => error_response(StatusCode::CONFLICT, &self.to_string()),
            CartError::UnknownPurchaser => {
                error_response(StatusCode::UNAUTHORIZED, &self.to_string())
            }
            CartError::NothingPurchasable(unavailable) => {
                #[derive(Serialize)]
                struct Body {
                    error: String,
                    unavailable: Vec<String>,
                }
                (
                    StatusCode::CONFLICT,
                    Json(Body {
                        error: "No products with enough stock".to_string(),
                        unavailable,
                    }),
                )
                    .into_response()
            }
            CartError::Store(e) => {
                log::error!("Cart store error: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
