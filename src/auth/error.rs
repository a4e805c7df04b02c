//! Authentication faults and the generic error responder

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::models::ErrorResponse;
use crate::db::StoreError;

/// Unexpected failures raised while authenticating.
///
/// Ordinary denials (bad password, duplicate email) are not errors; they
/// travel as `Outcome::Rejected`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("invalid header value: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        log::error!("Authentication fault: {}", self);
        match self {
            AuthError::Token(_) => {
                error_response(StatusCode::UNAUTHORIZED, "Invalid or expired token")
            }
            AuthError::Body(_) => error_response(StatusCode::BAD_REQUEST, "Invalid request body"),
            _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}
