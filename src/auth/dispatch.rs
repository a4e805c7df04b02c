//! Strategy dispatch middleware
//!
//! `passport_call` pairs an authenticator with a strategy; the pair is the
//! state of the [`authenticate`] middleware:
//!
//! ```ignore
//! post(handler).route_layer(middleware::from_fn_with_state(
//!     passport_call(registry.clone(), Strategy::Login),
//!     authenticate::<StrategyRegistry>,
//! ))
//! ```

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{
    error::{error_response, AuthError},
    strategy::{AuthRequest, Authenticator, Outcome, Strategy},
};

/// Largest credential body the dispatcher buffers
const MAX_CREDENTIAL_BODY: usize = 64 * 1024;

/// Middleware state: which strategy to run, and with what
pub struct PassportCall<A> {
    authenticator: Arc<A>,
    strategy: Strategy,
}

impl<A> Clone for PassportCall<A> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
            strategy: self.strategy,
        }
    }
}

pub fn passport_call<A: Authenticator>(authenticator: Arc<A>, strategy: Strategy) -> PassportCall<A> {
    PassportCall {
        authenticator,
        strategy,
    }
}

/// Run the strategy and act on its outcome.
///
/// Faults go to the error responder, rejections answer 401 and successes
/// continue with the identity stored in the request extensions.
pub async fn authenticate<A: Authenticator>(
    State(call): State<PassportCall<A>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (parts, body) = request.into_parts();

    let (auth_request, body) = if call.strategy.reads_body() {
        let bytes = to_bytes(body, MAX_CREDENTIAL_BODY)
            .await
            .map_err(|e| AuthError::Body(e.to_string()))?;
        let auth_request =
            AuthRequest::new(parts.headers.clone(), parts.uri.clone(), bytes.clone());
        (auth_request, Body::from(bytes))
    } else {
        let auth_request = AuthRequest::new(parts.headers.clone(), parts.uri.clone(), Bytes::new());
        (auth_request, body)
    };

    match call
        .authenticator
        .authenticate(call.strategy, &auth_request)
        .await
    {
        Outcome::Error(err) => Err(err),
        Outcome::Rejected(reason) => {
            log::debug!("{} strategy rejected request: {}", call.strategy.as_str(), reason);
            Ok(error_response(StatusCode::UNAUTHORIZED, &reason))
        }
        Outcome::Success(identity) => {
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
    }
}
