//! # Service Configuration
//!
//! `ServiceConfig` holds every setting the upload service needs at startup.
//! It is built through [`ServiceConfigBuilder`] and validated fail-fast, so a
//! misconfigured deployment stops before it binds a socket.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ServiceConfig;
//!
//! let config = ServiceConfig::builder()
//!     .client_id("1234.apps.googleusercontent.com")
//!     .client_secret("shhh")
//!     .redirect_uri("http://localhost:8080/auth/callback")
//!     .state_secret("a-long-random-value-from-the-vault")
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`ServiceConfig::from_env`] reads `CLOUDSYNC_*` variables:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `CLOUDSYNC_BIND_ADDR` | listen address (`127.0.0.1:8080`) |
//! | `CLOUDSYNC_GOOGLE_CLIENT_ID` | OAuth client id (required) |
//! | `CLOUDSYNC_GOOGLE_CLIENT_SECRET` | OAuth client secret (required) |
//! | `CLOUDSYNC_GOOGLE_REDIRECT_URI` | callback URL registered with the provider (required) |
//! | `CLOUDSYNC_GOOGLE_SCOPES` | space separated scopes |
//! | `CLOUDSYNC_TOKEN_STORE_DIR` | credential directory (`token_store`) |
//! | `CLOUDSYNC_SESSION_IDLE_SECS` | staging idle timeout (1800) |
//! | `CLOUDSYNC_MAX_UPLOAD_BYTES` | request body limit |
//! | `CLOUDSYNC_STATE_SECRET` | HMAC key for correlation tokens |
//! | `CLOUDSYNC_STATE_TTL_SECS` | correlation token lifetime (600) |
//! | `CLOUDSYNC_TRUST_PLAIN_STATE` | accept the bare identity as state |
//! | `CLOUDSYNC_LOG_FORMAT` | `pretty`, `json` or `compact` |
//! | `CLOUDSYNC_LOG_FILTER` | `EnvFilter` directives |

use crate::error::{Error, Result};
use crate::logging::LogFormat;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
pub const DEFAULT_TOKEN_STORE_DIR: &str = "token_store";
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

const MIN_STATE_SECRET_LEN: usize = 16;

/// OAuth client registration.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Correlation-state settings for the authorization redirect.
#[derive(Clone)]
pub struct StateSettings {
    /// HMAC key. `None` only when `trust_plain` is set.
    pub secret: Option<String>,
    pub ttl: Duration,
    /// Accept the identity itself as the state value, unsigned.
    pub trust_plain: bool,
}

impl std::fmt::Debug for StateSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("ttl", &self.ttl)
            .field("trust_plain", &self.trust_plain)
            .finish()
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub oauth: OAuthSettings,
    pub state: StateSettings,
    /// Directory holding one credential file per identity
    pub token_store_dir: PathBuf,
    /// Staged files are discarded after this much inactivity
    pub session_idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Upper bound on one multipart request body
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
    pub log_filter: Option<String>,
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; [`from_env`](Self::from_env) passes
    /// `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut builder = Self::builder();

        if let Some(addr) = get("CLOUDSYNC_BIND_ADDR") {
            builder = builder.bind_addr(parse_value("CLOUDSYNC_BIND_ADDR", &addr)?);
        }
        if let Some(id) = get("CLOUDSYNC_GOOGLE_CLIENT_ID") {
            builder = builder.client_id(id);
        }
        if let Some(secret) = get("CLOUDSYNC_GOOGLE_CLIENT_SECRET") {
            builder = builder.client_secret(secret);
        }
        if let Some(uri) = get("CLOUDSYNC_GOOGLE_REDIRECT_URI") {
            builder = builder.redirect_uri(uri);
        }
        if let Some(scopes) = get("CLOUDSYNC_GOOGLE_SCOPES") {
            builder = builder.scopes(scopes.split_whitespace().map(String::from).collect());
        }
        if let Some(url) = get("CLOUDSYNC_GOOGLE_AUTH_URL") {
            builder = builder.auth_url(url);
        }
        if let Some(url) = get("CLOUDSYNC_GOOGLE_TOKEN_URL") {
            builder = builder.token_url(url);
        }
        if let Some(dir) = get("CLOUDSYNC_TOKEN_STORE_DIR") {
            builder = builder.token_store_dir(dir);
        }
        if let Some(secs) = get("CLOUDSYNC_SESSION_IDLE_SECS") {
            let secs: u64 = parse_value("CLOUDSYNC_SESSION_IDLE_SECS", &secs)?;
            builder = builder.session_idle_timeout(Duration::from_secs(secs));
        }
        if let Some(bytes) = get("CLOUDSYNC_MAX_UPLOAD_BYTES") {
            builder = builder.max_upload_bytes(parse_value("CLOUDSYNC_MAX_UPLOAD_BYTES", &bytes)?);
        }
        if let Some(secret) = get("CLOUDSYNC_STATE_SECRET") {
            builder = builder.state_secret(secret);
        }
        if let Some(secs) = get("CLOUDSYNC_STATE_TTL_SECS") {
            let secs: u64 = parse_value("CLOUDSYNC_STATE_TTL_SECS", &secs)?;
            builder = builder.state_ttl(Duration::from_secs(secs));
        }
        if let Some(flag) = get("CLOUDSYNC_TRUST_PLAIN_STATE") {
            builder = builder.trust_plain_state(parse_flag("CLOUDSYNC_TRUST_PLAIN_STATE", &flag)?);
        }
        if let Some(format) = get("CLOUDSYNC_LOG_FORMAT") {
            builder = builder.log_format(format.parse()?);
        }
        if let Some(filter) = get("CLOUDSYNC_LOG_FILTER") {
            builder = builder.log_filter(filter);
        }

        builder.build()
    }

    /// Checks every invariant the service relies on.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() {
            return Err(Error::Config("OAuth client id cannot be empty".to_string()));
        }
        if self.oauth.client_secret.is_empty() {
            return Err(Error::Config(
                "OAuth client secret cannot be empty".to_string(),
            ));
        }
        if self.oauth.scopes.is_empty() {
            return Err(Error::Config(
                "At least one OAuth scope is required".to_string(),
            ));
        }

        for (name, value) in [
            ("redirect_uri", &self.oauth.redirect_uri),
            ("auth_url", &self.oauth.auth_url),
            ("token_url", &self.oauth.token_url),
        ] {
            Url::parse(value)
                .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", name, value, e)))?;
        }

        if self.token_store_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Token store directory cannot be empty".to_string(),
            ));
        }
        if self.session_idle_timeout.is_zero() {
            return Err(Error::Config(
                "Session idle timeout must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config(
                "Sweep interval must be greater than 0".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config(
                "Maximum upload size must be greater than 0".to_string(),
            ));
        }

        if !self.state.trust_plain {
            match &self.state.secret {
                None => {
                    return Err(Error::Config(
                        "A state secret is required unless plain state is trusted. \
                         Set CLOUDSYNC_STATE_SECRET."
                            .to_string(),
                    ))
                }
                Some(secret) if secret.len() < MIN_STATE_SECRET_LEN => {
                    return Err(Error::Config(format!(
                        "State secret must be at least {} bytes",
                        MIN_STATE_SECRET_LEN
                    )))
                }
                Some(_) => {}
            }
            if self.state.ttl.is_zero() {
                return Err(Error::Config(
                    "State lifetime must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", key, e)))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "Invalid value for {}: '{}' is not a boolean",
            key, other
        ))),
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Default)]
pub struct ServiceConfigBuilder {
    bind_addr: Option<SocketAddr>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
    scopes: Option<Vec<String>>,
    token_store_dir: Option<PathBuf>,
    session_idle_timeout: Option<Duration>,
    sweep_interval: Option<Duration>,
    max_upload_bytes: Option<usize>,
    state_secret: Option<String>,
    state_ttl: Option<Duration>,
    trust_plain_state: bool,
    log_format: Option<LogFormat>,
    log_filter: Option<String>,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn token_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_store_dir = Some(dir.into());
        self
    }

    pub fn session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = Some(timeout);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = Some(bytes);
        self
    }

    pub fn state_secret(mut self, secret: impl Into<String>) -> Self {
        self.state_secret = Some(secret.into());
        self
    }

    pub fn state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = Some(ttl);
        self
    }

    pub fn trust_plain_state(mut self, trust: bool) -> Self {
        self.trust_plain_state = trust;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Applies defaults, then validates.
    pub fn build(self) -> Result<ServiceConfig> {
        let client_id = self.client_id.ok_or_else(|| {
            Error::Config(
                "OAuth client id is required. Set CLOUDSYNC_GOOGLE_CLIENT_ID.".to_string(),
            )
        })?;
        let client_secret = self.client_secret.ok_or_else(|| {
            Error::Config(
                "OAuth client secret is required. Set CLOUDSYNC_GOOGLE_CLIENT_SECRET.".to_string(),
            )
        })?;
        let redirect_uri = self.redirect_uri.ok_or_else(|| {
            Error::Config(
                "OAuth redirect URI is required. Set CLOUDSYNC_GOOGLE_REDIRECT_URI.".to_string(),
            )
        })?;

        let bind_addr = match self.bind_addr {
            Some(addr) => addr,
            None => parse_value("bind address", DEFAULT_BIND_ADDR)?,
        };

        let config = ServiceConfig {
            bind_addr,
            oauth: OAuthSettings {
                client_id,
                client_secret,
                redirect_uri,
                auth_url: self.auth_url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
                token_url: self
                    .token_url
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
                scopes: self
                    .scopes
                    .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]),
            },
            state: StateSettings {
                secret: self.state_secret,
                ttl: self.state_ttl.unwrap_or(DEFAULT_STATE_TTL),
                trust_plain: self.trust_plain_state,
            },
            token_store_dir: self
                .token_store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_STORE_DIR)),
            session_idle_timeout: self
                .session_idle_timeout
                .unwrap_or(DEFAULT_SESSION_IDLE_TIMEOUT),
            sweep_interval: self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            log_format: self.log_format.unwrap_or_default(),
            log_filter: self.log_filter,
        };

        config.validate()?;

        Ok(config)
    }
}
