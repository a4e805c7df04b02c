//! Named authentication strategies
//!
//! A [`StrategyRegistry`] is built once at startup and shared read-only. Each
//! strategy turns an [`AuthRequest`] into an [`Outcome`]; none of them ever
//! writes an HTTP response.

use axum::{
    body::{Body, Bytes},
    extract::{Form, FromRequest, Query},
    http::{header::CONTENT_TYPE, HeaderMap, Method, Request, Uri},
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::str::FromStr;

use super::{
    database::UserDatabase,
    error::AuthError,
    extract::{cookie_value, TokenExtractor},
    jwt::JwtManager,
    models::{
        Identity, LoginRequest, NewIdentity, OAuthCallback, OAuthProfile, RegisterRequest, Role,
    },
    oauth::OAuthManager,
    password::{hash_password, verify_password},
};
use crate::db::StoreError;

/// Cookie holding the CSRF state between the GitHub redirect and its callback
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Age recorded for identities provisioned from GitHub
pub const FEDERATED_DEFAULT_AGE: u32 = 18;

const MISSING_CREDENTIALS: &str = "Missing credentials";
const INVALID_CREDENTIALS: &str = "Invalid credentials";
const EMAIL_TAKEN: &str = "Email already registered";

/// Result of running a strategy
#[derive(Debug)]
pub enum Outcome {
    Success(Identity),
    Rejected(String),
    Error(AuthError),
}

impl Outcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Outcome::Rejected(reason.into())
    }
}

/// The closed set of strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Register,
    Login,
    Github,
    Token,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Register => "register",
            Strategy::Login => "login",
            Strategy::Github => "github",
            Strategy::Token => "token",
        }
    }

    /// Strategies reading credentials from the request body
    pub fn reads_body(&self) -> bool {
        matches!(self, Strategy::Register | Strategy::Login)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(Strategy::Register),
            "login" => Ok(Strategy::Login),
            "github" => Ok(Strategy::Github),
            "token" | "jwt" => Ok(Strategy::Token),
            other => Err(format!("Unknown strategy: {other}")),
        }
    }
}

/// What a strategy gets to see of an incoming request
#[derive(Debug, Clone)]
pub struct AuthRequest {
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
}

impl AuthRequest {
    pub fn new(headers: HeaderMap, uri: Uri, body: Bytes) -> Self {
        Self { headers, uri, body }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Parse the buffered body as JSON or url-encoded form data
    pub async fn credentials<T: DeserializeOwned>(&self) -> Option<T> {
        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/json") {
            return serde_json::from_slice(&self.body).ok();
        }

        let request = Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(self.body.clone()))
            .ok()?;
        Form::<T>::from_request(request, &())
            .await
            .ok()
            .map(|Form(value)| value)
    }

    /// Parse the query string
    pub fn query<T: DeserializeOwned>(&self) -> Option<T> {
        Query::<T>::try_from_uri(&self.uri)
            .ok()
            .map(|Query(value)| value)
    }
}

/// Anything able to run a named strategy against a request
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        strategy: Strategy,
        request: &AuthRequest,
    ) -> impl Future<Output = Outcome> + Send;
}

/// Registry of the four strategies and their collaborators
pub struct StrategyRegistry {
    directory: UserDatabase,
    jwt: JwtManager,
    oauth: OAuthManager,
    extractor: TokenExtractor,
    admin_email: Option<String>,
}

impl StrategyRegistry {
    pub fn new(directory: UserDatabase, jwt: JwtManager, oauth: OAuthManager) -> Self {
        let extractor = TokenExtractor::cookie(jwt.cookie_name());
        Self {
            directory,
            jwt,
            oauth,
            extractor,
            admin_email: None,
        }
    }

    /// Email that receives the admin role when it registers
    pub fn with_admin_email(mut self, admin_email: Option<String>) -> Self {
        self.admin_email = admin_email;
        self
    }

    pub fn directory(&self) -> &UserDatabase {
        &self.directory
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub fn oauth(&self) -> &OAuthManager {
        &self.oauth
    }

    /// Run one strategy
    pub async fn run(&self, strategy: Strategy, request: &AuthRequest) -> Outcome {
        let result = match strategy {
            Strategy::Register => self.register(request).await,
            Strategy::Login => self.login(request).await,
            Strategy::Github => self.github(request).await,
            Strategy::Token => self.token(request),
        };
        match result {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Error(err),
        }
    }

    async fn register(&self, request: &AuthRequest) -> Result<Outcome, AuthError> {
        let Some(form) = request.credentials::<RegisterRequest>().await else {
            return Ok(Outcome::rejected(MISSING_CREDENTIALS));
        };
        if form.email.is_empty() || form.password.is_empty() {
            return Ok(Outcome::rejected(MISSING_CREDENTIALS));
        }

        if self.directory.find_by_email(&form.email)?.is_some() {
            return Ok(Outcome::rejected(EMAIL_TAKEN));
        }

        let password_hash = hash_password(&form.password).map_err(AuthError::Hash)?;
        let role = if self.admin_email.as_deref() == Some(form.email.as_str()) {
            Role::Admin
        } else {
            Role::User
        };

        self.create_local(NewIdentity {
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
            age: form.age,
            role,
            password_hash: Some(password_hash),
        })
    }

    /// Insert a registered identity. The email may have been taken since the
    /// pre-check; the UNIQUE constraint then turns it into a rejection.
    fn create_local(&self, fields: NewIdentity) -> Result<Outcome, AuthError> {
        match self.directory.create(fields) {
            Ok(identity) => {
                log::info!("Registered {} ({})", identity.email, identity.id);
                Ok(Outcome::Success(identity))
            }
            Err(StoreError::DuplicateEmail) => Ok(Outcome::rejected(EMAIL_TAKEN)),
            Err(e) => Err(e.into()),
        }
    }

    async fn login(&self, request: &AuthRequest) -> Result<Outcome, AuthError> {
        let Some(form) = request.credentials::<LoginRequest>().await else {
            return Ok(Outcome::rejected(MISSING_CREDENTIALS));
        };

        let Some(identity) = self.directory.find_by_email(&form.email)? else {
            return Ok(Outcome::rejected(INVALID_CREDENTIALS));
        };

        if verify_password(&form.password, identity.password_hash.as_deref()) {
            Ok(Outcome::Success(identity))
        } else {
            Ok(Outcome::rejected(INVALID_CREDENTIALS))
        }
    }

    async fn github(&self, request: &AuthRequest) -> Result<Outcome, AuthError> {
        let Some(OAuthCallback {
            code: Some(code),
            state,
        }) = request.query::<OAuthCallback>()
        else {
            return Ok(Outcome::rejected("Missing authorization code"));
        };

        let expected_state = cookie_value(request.headers(), OAUTH_STATE_COOKIE);
        if expected_state.is_none() || expected_state != state {
            return Ok(Outcome::rejected("Invalid OAuth state"));
        }

        let profile = self
            .oauth
            .exchange_code(&code)
            .await
            .map_err(AuthError::OAuth)?;
        self.federated_identity(profile)
    }

    /// Resolve a provider profile to an identity, provisioning it if needed.
    ///
    /// Provisioned identities carry no password hash and can only come back
    /// through the provider.
    pub fn federated_identity(&self, profile: OAuthProfile) -> Result<Outcome, AuthError> {
        if let Some(identity) = self.directory.find_by_email(&profile.email)? {
            return Ok(Outcome::Success(identity));
        }

        let created = self.directory.create(NewIdentity {
            first_name: profile.display_name,
            last_name: String::new(),
            email: profile.email.clone(),
            age: FEDERATED_DEFAULT_AGE,
            role: Role::User,
            password_hash: None,
        });

        match created {
            Ok(identity) => {
                log::info!("Provisioned GitHub identity {}", identity.email);
                Ok(Outcome::Success(identity))
            }
            Err(StoreError::DuplicateEmail) => match self.directory.find_by_email(&profile.email)? {
                Some(identity) => Ok(Outcome::Success(identity)),
                None => Err(StoreError::DuplicateEmail.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Trusts the signed snapshot; the store is not consulted.
    fn token(&self, request: &AuthRequest) -> Result<Outcome, AuthError> {
        let Some(token) = self.extractor.extract(request.headers(), request.uri()) else {
            return Ok(Outcome::rejected("No auth token"));
        };
        let claims = self.jwt.verify_token(&token)?;
        Ok(Outcome::Success(claims.user))
    }
}

impl Authenticator for StrategyRegistry {
    fn authenticate(
        &self,
        strategy: Strategy,
        request: &AuthRequest,
    ) -> impl Future<Output = Outcome> + Send {
        self.run(strategy, request)
    }
}
