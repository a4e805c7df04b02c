//! Session REST API routes

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::{
    dispatch::{authenticate, passport_call},
    error::{error_response, AuthError},
    models::*,
    strategy::{Strategy, StrategyRegistry, OAUTH_STATE_COOKIE},
};

/// Seconds the browser has to come back from GitHub
const OAUTH_STATE_TTL: u64 = 600;

/// Create session router
pub fn auth_router(registry: Arc<StrategyRegistry>) -> Router {
    let dispatch = |strategy: Strategy| {
        middleware::from_fn_with_state(
            passport_call(Arc::clone(&registry), strategy),
            authenticate::<StrategyRegistry>,
        )
    };

    Router::new()
        .route(
            "/register",
            post(registered).route_layer(dispatch(Strategy::Register)),
        )
        .route("/login", post(logged_in).route_layer(dispatch(Strategy::Login)))
        .route("/github", get(github_redirect))
        .route(
            "/githubcallback",
            get(github_callback).route_layer(dispatch(Strategy::Github)),
        )
        .route("/current", get(current).route_layer(dispatch(Strategy::Token)))
        .route("/logout", post(logout))
        .route("/providers", get(get_providers))
        .with_state(registry)
}

/// POST /api/sessions/register
async fn registered(Extension(user): Extension<Identity>) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(RegisteredResponse {
            status: "success".to_string(),
            user,
        }),
    )
}

/// POST /api/sessions/login - issue the session cookie
async fn logged_in(
    State(registry): State<Arc<StrategyRegistry>>,
    Extension(user): Extension<Identity>,
) -> Result<Response, AuthError> {
    let token = registry.jwt().create_token(&user)?;
    let cookie = registry.jwt().session_cookie(&token)?;
    log::info!("Session opened for {}", user.email);
    Ok(([(SET_COOKIE, cookie)], Json(AuthResponse { token, user })).into_response())
}

/// GET /api/sessions/github - redirect to GitHub
async fn github_redirect(State(registry): State<Arc<StrategyRegistry>>) -> Result<Response, AuthError> {
    if !registry.oauth().is_configured() {
        return Ok(error_response(StatusCode::NOT_FOUND, "GitHub login not configured"));
    }

    let (url, csrf_token) = registry.oauth().get_auth_url().map_err(AuthError::OAuth)?;
    let state_cookie = HeaderValue::from_str(&format!(
        "{OAUTH_STATE_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={OAUTH_STATE_TTL}",
        csrf_token.secret()
    ))?;
    Ok(([(SET_COOKIE, state_cookie)], Redirect::temporary(&url)).into_response())
}

/// GET /api/sessions/githubcallback - finish the OAuth flow
async fn github_callback(
    State(registry): State<Arc<StrategyRegistry>>,
    Extension(user): Extension<Identity>,
) -> Result<Response, AuthError> {
    let token = registry.jwt().create_token(&user)?;

    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, registry.jwt().session_cookie(&token)?);
    headers.append(
        SET_COOKIE,
        HeaderValue::from_str(&format!(
            "{OAUTH_STATE_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        ))?,
    );

    log::info!("GitHub session opened for {}", user.email);
    Ok((headers, Redirect::temporary(registry.oauth().success_redirect())).into_response())
}

/// GET /api/sessions/current - identity carried by the session token
async fn current(Extension(user): Extension<Identity>) -> Json<Identity> {
    Json(user)
}

/// POST /api/sessions/logout
async fn logout(State(registry): State<Arc<StrategyRegistry>>) -> Result<Response, AuthError> {
    let cookie = registry.jwt().clear_cookie()?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response())
}

/// GET /api/sessions/providers - configured OAuth providers
async fn get_providers(State(registry): State<Arc<StrategyRegistry>>) -> impl IntoResponse {
    #[derive(Serialize)]
    struct ProvidersResponse {
        providers: Vec<String>,
    }

    let mut providers = Vec::new();
    if registry.oauth().is_configured() {
        providers.push("github".to_string());
    }

    Json(ProvidersResponse { providers })
}
