//! GitHub OAuth2 (authorization code flow)

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::models::OAuthProfile;

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "storefront";

type GithubClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth configuration
#[derive(Clone)]
pub struct OAuthConfig {
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub callback_url: String,
    pub success_redirect: String,
}

impl OAuthConfig {
    pub fn from_env() -> Self {
        Self {
            github_client_id: std::env::var("GITHUB_CLIENT_ID").ok(),
            github_client_secret: std::env::var("GITHUB_CLIENT_SECRET").ok(),
            callback_url: std::env::var("GITHUB_CALLBACK_URL").unwrap_or_else(|_| {
                "http://localhost:8080/api/sessions/githubcallback".to_string()
            }),
            success_redirect: std::env::var("OAUTH_SUCCESS_REDIRECT")
                .unwrap_or_else(|_| "/".to_string()),
        }
    }

    /// Configuration with no provider credentials
    pub fn disabled() -> Self {
        Self {
            github_client_id: None,
            github_client_secret: None,
            callback_url: "http://localhost/api/sessions/githubcallback".to_string(),
            success_redirect: "/".to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.github_client_id.is_some() && self.github_client_secret.is_some()
    }
}

/// OAuth manager
#[derive(Clone)]
pub struct OAuthManager {
    config: OAuthConfig,
    http_client: HttpClient,
}

impl OAuthManager {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http_client: HttpClient::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Where the browser goes once the callback succeeded
    pub fn success_redirect(&self) -> &str {
        &self.config.success_redirect
    }

    /// Authorization URL plus the CSRF state the callback must echo
    pub fn get_auth_url(&self) -> Result<(String, CsrfToken), String> {
        let client = self.create_client()?;

        let (url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("user:email".to_string()))
            .add_scope(Scope::new("read:user".to_string()))
            .url();
        Ok((url.to_string(), csrf_token))
    }

    /// Exchange authorization code for the GitHub profile
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, String> {
        let client = self.create_client()?;

        // The token endpoint must not be followed through redirects.
        let token_http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| format!("Failed to build OAuth HTTP client: {}", e))?;

        let token_result = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&token_http)
            .await
            .map_err(|e| format!("Token exchange failed: {}", e))?;

        self.fetch_github_profile(token_result.access_token().secret())
            .await
    }

    fn create_client(&self) -> Result<GithubClient, String> {
        let client_id = self
            .config
            .github_client_id
            .as_ref()
            .ok_or("GitHub client ID not configured")?;
        let client_secret = self
            .config
            .github_client_secret
            .as_ref()
            .ok_or("GitHub client secret not configured")?;

        Ok(BasicClient::new(ClientId::new(client_id.clone()))
            .set_client_secret(ClientSecret::new(client_secret.clone()))
            .set_auth_uri(AuthUrl::new(GITHUB_AUTH_URL.to_string()).map_err(|e| e.to_string())?)
            .set_token_uri(
                TokenUrl::new(GITHUB_TOKEN_URL.to_string()).map_err(|e| e.to_string())?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.config.callback_url.clone()).map_err(|e| e.to_string())?,
            ))
    }

    async fn fetch_github_profile(&self, access_token: &str) -> Result<OAuthProfile, String> {
        #[derive(Deserialize)]
        struct GithubUser {
            login: String,
            name: Option<String>,
            email: Option<String>,
        }

        #[derive(Deserialize)]
        struct GithubEmail {
            email: String,
            primary: bool,
            verified: bool,
        }

        let user: GithubUser = self
            .http_client
            .get(format!("{GITHUB_API_URL}/user"))
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch GitHub user info: {}", e))?
            .json()
            .await
            .map_err(|e| format!("Failed to parse GitHub user info: {}", e))?;

        // Private emails only show up on the emails endpoint
        let email = match user.email {
            Some(email) => email,
            None => {
                let emails: Vec<GithubEmail> = self
                    .http_client
                    .get(format!("{GITHUB_API_URL}/user/emails"))
                    .bearer_auth(access_token)
                    .header("User-Agent", USER_AGENT)
                    .send()
                    .await
                    .map_err(|e| format!("Failed to fetch GitHub emails: {}", e))?
                    .json()
                    .await
                    .map_err(|e| format!("Failed to parse GitHub emails: {}", e))?;

                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .ok_or("No verified primary email found")?
            }
        };

        Ok(OAuthProfile {
            email,
            display_name: user.name.unwrap_or(user.login),
        })
    }
}
