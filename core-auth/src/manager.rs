//! # Authorization Manager
//!
//! Runs the authorization code flow for identities and hands out live access
//! tokens to the storage connector.
//!
//! ## Overview
//!
//! `AuthManager` combines the [`TokenStore`], the [`OAuthFlowManager`] and the
//! [`CorrelationCodec`]. It implements [`AuthorizationService`] for the upload
//! workflow and [`TokenProvider`] for the storage connector, emitting
//! [`AuthEvent`]s on the event bus as identities move through
//! `Unauthenticated -> PendingCallback -> Authenticated`.
//!
//! ## Refresh
//!
//! `access_token` refreshes tokens that expire within five minutes. Refresh
//! and persist happen under a per-identity lock, so concurrent uploads for one
//! identity issue a single refresh.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthManager, AuthorizationService, CorrelationCodec, Identity, OAuthConfig, OAuthFlowManager, TokenStore};
//! use core_runtime::events::EventBus;
//! use bridge_traits::{SystemClock, http::HttpClient, storage::SecureStore};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     secure_store: Arc<dyn SecureStore>,
//! #     http_client: Arc<dyn HttpClient>,
//! #     config: OAuthConfig,
//! # ) -> core_auth::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let manager = AuthManager::new(
//!     TokenStore::new(secure_store),
//!     OAuthFlowManager::new(config, http_client),
//!     CorrelationCodec::signed("a-long-random-secret", std::time::Duration::from_secs(600), clock.clone())?,
//!     EventBus::default(),
//!     clock,
//! );
//!
//! let identity = Identity::parse("user@example.com")?;
//! if !manager.check_authenticated(&identity).await? {
//!     let url = manager.begin_authorization(&identity).await?;
//!     // Redirect the browser to `url`
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::service::AuthorizationService;
use crate::state::CorrelationCodec;
use crate::token_store::TokenStore;
use crate::types::{AuthState, Identity, OAuthTokens};
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::remote::TokenProvider;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

/// Default timeout for calls to the token endpoint (2 minutes)
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens expiring within this window are refreshed before use (5 minutes)
const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// How long an unsigned authorization stays pending (10 minutes)
const DEFAULT_PENDING_TTL_SECS: i64 = 600;

pub struct AuthManager {
    token_store: TokenStore,
    oauth: OAuthFlowManager,
    codec: CorrelationCodec,
    event_bus: EventBus,
    /// Identities with an issued authorization URL and no callback yet
    pending: RwLock<HashMap<Identity, DateTime<Utc>>>,
    refresh_locks: Mutex<HashMap<Identity, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    pub fn new(
        token_store: TokenStore,
        oauth: OAuthFlowManager,
        codec: CorrelationCodec,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_store,
            oauth,
            codec,
            event_bus,
            pending: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Where `identity` currently sits in the authorization flow.
    pub async fn auth_state(&self, identity: &Identity) -> Result<AuthState> {
        if self.check_authenticated(identity).await? {
            return Ok(AuthState::Authenticated);
        }
        let now = self.clock.now();
        let pending_ttl = self.pending_ttl();
        let is_pending = self
            .pending
            .read()
            .await
            .get(identity)
            .map_or(false, |issued| now - *issued <= pending_ttl);
        if is_pending {
            return Ok(AuthState::PendingCallback);
        }
        Ok(AuthState::Unauthenticated)
    }

    /// Drop pending authorizations older than the state lifetime.
    pub async fn purge_stale_pending(&self) -> usize {
        let now = self.clock.now();
        let pending_ttl = self.pending_ttl();

        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, issued| now - *issued <= pending_ttl);
        let purged = before - pending.len();
        if purged > 0 {
            debug!(purged, "Stale pending authorizations dropped");
        }
        purged
    }

    fn pending_ttl(&self) -> chrono::Duration {
        self.codec
            .ttl()
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_PENDING_TTL_SECS))
    }

    /// Delete the stored credential for `identity`.
    #[instrument(skip(self, identity), fields(identity = %identity.redacted()))]
    pub async fn sign_out(&self, identity: &Identity) -> Result<()> {
        self.token_store.delete_tokens(identity).await?;
        self.pending.write().await.remove(identity);

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut {
            identity: identity.to_string(),
        }));

        info!("Signed out");
        Ok(())
    }

    /// A live access token for `identity`, refreshed first when it is about
    /// to expire.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] when no credential is stored or the
    /// stored one is expired and cannot be refreshed.
    #[instrument(skip(self, identity), fields(identity = %identity.redacted()))]
    pub async fn valid_access_token(&self, identity: &Identity) -> Result<String> {
        let lock = self.refresh_lock(identity).await;
        let _guard = lock.lock().await;

        let tokens = self
            .token_store
            .retrieve_tokens(identity)
            .await?
            .ok_or_else(|| AuthError::NotAuthenticated(identity.redacted()))?;

        let now = self.clock.now();
        if !tokens.is_expired_at(now, TOKEN_REFRESH_BUFFER_SECS) {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref().filter(|t| !t.is_empty())
        else {
            if tokens.is_expired_at(now, 0) {
                warn!("Access token expired and no refresh token is stored");
                return Err(AuthError::NotAuthenticated(identity.redacted()));
            }
            debug!("Access token near expiry, no refresh token; using it as is");
            return Ok(tokens.access_token);
        };

        info!("Refreshing access token");
        let refreshed = match timeout(
            DEFAULT_AUTH_TIMEOUT,
            self.oauth.refresh_access_token(refresh_token),
        )
        .await
        {
            Ok(Ok(refreshed)) => refreshed,
            Ok(Err(e)) => {
                error!(error = %e, "Token refresh failed");
                self.emit_error(Some(identity), format!("Token refresh failed: {}", e));
                return Err(e);
            }
            Err(_) => {
                error!("Token refresh timed out");
                self.emit_error(Some(identity), "Token refresh timed out".to_string());
                return Err(AuthError::OperationTimeout {
                    operation: "token refresh".to_string(),
                });
            }
        };

        self.token_store.store_tokens(identity, &refreshed).await?;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
            identity: identity.to_string(),
            expires_at: refreshed.expires_at.timestamp(),
        }));

        Ok(refreshed.access_token)
    }

    async fn refresh_lock(&self, identity: &Identity) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn emit_error(&self, identity: Option<&Identity>, message: String) {
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
            identity: identity.map(ToString::to_string),
            message,
        }));
    }
}

#[async_trait]
impl AuthorizationService for AuthManager {
    #[instrument(skip(self, identity), fields(identity = %identity.redacted()))]
    async fn check_authenticated(&self, identity: &Identity) -> Result<bool> {
        match self.token_store.retrieve_tokens(identity).await {
            Ok(Some(tokens)) => Ok(tokens.is_usable_at(self.clock.now())),
            Ok(None) => Ok(false),
            Err(AuthError::TokenCorrupted { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, identity), fields(identity = %identity.redacted()))]
    async fn begin_authorization(&self, identity: &Identity) -> Result<String> {
        let state = self.codec.encode(identity)?;
        let url = self.oauth.build_auth_url(&state)?;

        self.pending
            .write()
            .await
            .insert(identity.clone(), self.clock.now());

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::AuthorizationStarted {
                identity: identity.to_string(),
            }));

        info!("Authorization URL issued");
        Ok(url)
    }

    #[instrument(skip(self, code, identity), fields(identity = %identity.redacted()))]
    async fn complete_authorization(&self, code: &str, identity: &Identity) -> Result<()> {
        let mut tokens = match timeout(DEFAULT_AUTH_TIMEOUT, self.oauth.exchange_code(code)).await
        {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(e)) => {
                error!(error = %e, "Authorization code exchange failed");
                self.emit_error(Some(identity), e.to_string());
                return Err(e);
            }
            Err(_) => {
                error!("Authorization code exchange timed out");
                self.emit_error(Some(identity), "Authentication timeout".to_string());
                return Err(AuthError::OperationTimeout {
                    operation: "token exchange".to_string(),
                });
            }
        };

        // Re-consent may come back without a refresh token; keep the old one.
        if !tokens.can_refresh() {
            if let Ok(Some(previous)) = self.token_store.retrieve_tokens(identity).await {
                tokens = OAuthTokens::new(tokens.access_token, previous.refresh_token, tokens.expires_at);
            }
        }

        self.token_store
            .store_tokens(identity, &tokens)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to store tokens");
                self.emit_error(Some(identity), format!("Failed to store credentials: {}", e));
                e
            })?;

        self.pending.write().await.remove(identity);

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::Authorized {
            identity: identity.to_string(),
        }));

        info!("Authorization completed");
        Ok(())
    }

    fn resolve_state(&self, state: &str) -> Result<Identity> {
        self.codec.decode(state)
    }

    async fn purge_expired(&self) -> usize {
        self.purge_stale_pending().await
    }
}

#[async_trait]
impl TokenProvider for AuthManager {
    async fn access_token(&self, account: &str) -> BridgeResult<String> {
        let identity = Identity::parse(account)?;
        Ok(self.valid_access_token(&identity).await?)
    }
}
