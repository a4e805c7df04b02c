//! Authentication data models

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: u32,
    #[serde(default)]
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub created_at: String,
}

/// Access role checked by the authorization guard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// Fields needed to create an identity
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: u32,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user: Identity, // snapshot taken when the token was issued
    pub exp: usize,
    pub iat: usize,
}

/// API request/response types
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub age: u32,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Identity,
}

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub status: String,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// OAuth callback data
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Profile returned by the OAuth provider
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub email: String,
    pub display_name: String,
}
