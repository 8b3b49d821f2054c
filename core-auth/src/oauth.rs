//! OAuth 2.0 Authorization Code Flow
//!
//! Builds the provider authorization URL, exchanges authorization codes for
//! tokens and refreshes expired access tokens (RFC 6749 §4.1 and §6).
//!
//! Codes, tokens and client secrets are never logged.
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let config = OAuthConfig {
//!     client_id: "your-client-id".to_string(),
//!     client_secret: Some("your-client-secret".to_string()),
//!     redirect_uri: "http://localhost:8080/auth/callback".to_string(),
//!     scopes: vec!["https://www.googleapis.com/auth/drive.file".to_string()],
//!     auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
//!     token_url: "https://oauth2.googleapis.com/token".to_string(),
//! };
//!
//! let flow = OAuthFlowManager::new(config, http_client);
//! let url = flow.build_auth_url("opaque-state")?;
//! // Redirect the browser to `url`, then on callback:
//! let tokens = flow.exchange_code("code-from-callback").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use chrono::Utc;
use core_runtime::config::OAuthSettings;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth 2.0 client configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// `None` for public clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl From<&OAuthSettings> for OAuthConfig {
    fn from(settings: &OAuthSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: Some(settings.client_secret.clone()),
            redirect_uri: settings.redirect_uri.clone(),
            scopes: settings.scopes.clone(),
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Error body returned by the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Drives the authorization code flow against one provider.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Authorization URL carrying `state` for correlation.
    ///
    /// Offline access with forced consent is requested so the provider issues
    /// a refresh token on every grant.
    #[instrument(skip(self, state))]
    pub fn build_auth_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Config(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        debug!("Built authorization URL");
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenExchangeFailed`] when the provider rejects the code
    /// or the redirect URI, [`AuthError::NetworkError`] when it cannot be
    /// reached.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        debug!("Exchanging authorization code for tokens");

        let response = self.post_token_request(&params).await?;
        if !response.is_success() {
            let reason = describe_token_error(&response);
            warn!(status = response.status, reason = %reason, "Authorization code exchange rejected");
            return Err(AuthError::TokenExchangeFailed(reason));
        }

        let token_response: TokenResponse = response.json().map_err(|e| {
            AuthError::TokenExchangeFailed(format!("Malformed token response: {}", e))
        })?;

        info!(
            expires_in = token_response.expires_in,
            has_refresh_token = token_response.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );

        Ok(OAuthTokens::issued_at(
            Utc::now(),
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        ))
    }

    /// Obtain a new access token with the refresh-token grant.
    ///
    /// Providers usually omit the refresh token on refresh; the one passed in
    /// is carried over in that case. No retry is attempted.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        debug!("Refreshing access token");

        let response = self.post_token_request(&params).await?;
        if !response.is_success() {
            let reason = describe_token_error(&response);
            warn!(status = response.status, reason = %reason, "Token refresh rejected");
            return Err(AuthError::TokenRefreshFailed(reason));
        }

        let token_response: TokenResponse = response.json().map_err(|e| {
            AuthError::TokenRefreshFailed(format!("Malformed token response: {}", e))
        })?;

        Ok(OAuthTokens::issued_at(
            Utc::now(),
            token_response.access_token,
            token_response
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            token_response.expires_in,
        ))
    }

    async fn post_token_request(&self, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .form(params)
            .map_err(|e| AuthError::SerializationFailed(e.to_string()))?
            .header("Accept", "application/json")
            .timeout(TOKEN_REQUEST_TIMEOUT);

        self.http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))
    }
}

fn describe_token_error(response: &HttpResponse) -> String {
    match response.json::<TokenErrorResponse>() {
        Ok(body) => match body.error_description {
            Some(description) => format!("{}: {}", body.error, description),
            None => body.error,
        },
        Err(_) => format!("token endpoint returned HTTP {}", response.status),
    }
}
