//! Role-based route guard
//!
//! Runs after the dispatch middleware and reads the identity it attached.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use super::{
    error::error_response,
    models::{Identity, Role},
};

pub async fn authorization(State(required): State<Role>, request: Request, next: Next) -> Response {
    let allowed = match request.extensions().get::<Identity>() {
        Some(identity) => identity.role == required,
        None => return error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
    };
    if !allowed {
        return error_response(StatusCode::FORBIDDEN, "No permissions");
    }
    next.run(request).await
}
