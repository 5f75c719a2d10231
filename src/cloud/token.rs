use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::CloudError;

/// Refresh a little before the provider says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on how long a token is trusted, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct RefreshCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Long-lived bearer token supplied by the operator
    Static(String),
    /// OAuth2 refresh-token grant
    Refresh(RefreshCredentials),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    refresh_token: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

struct TokenState {
    cached: Option<CachedToken>,
    /// Providers may rotate the refresh token on every exchange
    refresh_token: String,
}

/// Hands out bearer tokens, exchanging the refresh token when the cached
/// access token is missing or about to expire.
pub struct TokenProvider {
    source: TokenSource,
    http: Client,
    state: Mutex<TokenState>,
}

impl TokenProvider {
    pub fn new(source: TokenSource, http: Client) -> Self {
        let refresh_token = match &source {
            TokenSource::Static(_) => String::new(),
            TokenSource::Refresh(credentials) => credentials.refresh_token.clone(),
        };

        TokenProvider {
            source,
            http,
            state: Mutex::new(TokenState {
                cached: None,
                refresh_token,
            }),
        }
    }

    /// A bearer token for the next request.
    ///
    /// Static tokens are returned as is. Refreshed tokens are reused until a
    /// minute before they expire, and never for more than a day.
    ///
    /// # Returns
    /// * `Result<String, CloudError>` - The access token, or `CloudError::Token`
    ///   when the exchange fails
    pub async fn access_token(&self) -> Result<String, CloudError> {
        let credentials = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Refresh(credentials) => credentials,
        };

        // held across the exchange so concurrent callers share one refresh
        let mut state = self.state.lock().await;
        if let Some(cached) = &state.cached {
            if Instant::now() + EXPIRY_MARGIN < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("refresh_token", state.refresh_token.clone()),
        ];
        if let Some(scope) = &credentials.scope {
            form.push(("scope", scope.clone()));
        }

        log::debug!("refreshing access token at {}", credentials.token_url);
        let response = self
            .http
            .post(&credentials.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CloudError::Token(e.to_string()))?;

        if !response.status().is_success() {
            let (error, _) = super::api_error("token endpoint", response).await;
            return Err(CloudError::Token(error.to_string()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Token(format!("unreadable token response: {}", e)))?;

        if let Some(rotated) = token.refresh_token {
            state.refresh_token = rotated;
        }
        let lifetime = token.expires_in.min(MAX_TOKEN_LIFETIME);
        state.cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        log::info!("access token refreshed, valid for {}s", lifetime);
        Ok(token.access_token)
    }
}
