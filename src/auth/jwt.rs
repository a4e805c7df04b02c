//! JWT token handling

use http::header::InvalidHeaderValue;
use http::HeaderValue;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use super::models::{Claims, Identity};

pub const DEFAULT_COOKIE_NAME: &str = "jwt";
const DEFAULT_SECRET: &str = "default-secret-change-me";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
    expiration_hours: u64,
    cookie_name: String,
}

impl JwtConfig {
    pub fn new(secret: String, expiration_hours: u64) -> Self {
        Self {
            secret,
            expiration_hours,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set, falling back to the development secret");
            DEFAULT_SECRET.to_string()
        });
        let expiration_hours = std::env::var("JWT_EXPIRATION_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);
        let cookie_name =
            std::env::var("JWT_COOKIE_NAME").unwrap_or_else(|_| DEFAULT_COOKIE_NAME.to_string());
        Self::new(secret, expiration_hours).with_cookie_name(cookie_name)
    }
}

/// Issues and verifies session tokens
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    /// Name of the cookie carrying the session token
    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    fn ttl_seconds(&self) -> u64 {
        self.config.expiration_hours * 3600
    }

    /// Create a new JWT embedding a snapshot of the identity
    pub fn create_token(&self, user: &Identity) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        let expiration = now + self.ttl_seconds() as usize;

        let claims = Claims {
            user: user.clone(),
            exp: expiration,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
    }

    /// Verify signature and expiry, then decode the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    /// `Set-Cookie` value carrying a session token
    pub fn session_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.config.cookie_name,
            token,
            self.ttl_seconds()
        ))
    }

    /// `Set-Cookie` value removing the session cookie
    pub fn clear_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.config.cookie_name
        ))
    }
}
