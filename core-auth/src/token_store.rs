//! Credential Store
//!
//! Persists one OAuth token set per identity through a [`SecureStore`].
//! Values are JSON; keys are `oauth_tokens:<identity>`.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{Identity, OAuthTokens, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//! let identity = Identity::parse("user@example.com")?;
//!
//! let tokens = OAuthTokens::issued_at(chrono::Utc::now(), "ya29".into(), Some("1//r".into()), 3600);
//! token_store.store_tokens(&identity, &tokens).await?;
//!
//! let loaded = token_store.retrieve_tokens(&identity).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{Identity, OAuthTokens};
use bridge_traits::storage::SecureStore;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "oauth_tokens:";

/// Per-identity token persistence.
///
/// Token values never appear in logs or error messages.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix seconds
    expires_at: i64,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    /// Store tokens, replacing any previous set for `identity`.
    pub async fn store_tokens(&self, identity: &Identity, tokens: &OAuthTokens) -> Result<()> {
        let stored = StoredTokens {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at.timestamp(),
        };

        let json = serde_json::to_vec(&stored)
            .map_err(|e| AuthError::SerializationFailed(e.to_string()))?;

        self.secure_store
            .set_secret(&storage_key(identity), &json)
            .await
            .map_err(|e| {
                warn!(identity = %identity.redacted(), error = %e, "Failed to persist tokens");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            identity = %identity.redacted(),
            has_refresh_token = stored.refresh_token.is_some(),
            "Tokens stored"
        );
        Ok(())
    }

    /// Load the tokens for `identity`.
    ///
    /// Corrupted entries are deleted and reported as
    /// [`AuthError::TokenCorrupted`], so the next lookup sees no credential.
    pub async fn retrieve_tokens(&self, identity: &Identity) -> Result<Option<OAuthTokens>> {
        let key = storage_key(identity);

        let data = self.secure_store.get_secret(&key).await.map_err(|e| {
            warn!(identity = %identity.redacted(), error = %e, "Failed to read tokens");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(identity = %identity.redacted(), "No stored tokens");
            return Ok(None);
        };

        let parsed = serde_json::from_slice::<StoredTokens>(&data)
            .map_err(|e| e.to_string())
            .and_then(|stored| {
                Utc.timestamp_opt(stored.expires_at, 0)
                    .single()
                    .map(|expires_at| {
                        OAuthTokens::new(stored.access_token, stored.refresh_token, expires_at)
                    })
                    .ok_or_else(|| format!("expiry {} out of range", stored.expires_at))
            });

        match parsed {
            Ok(tokens) => Ok(Some(tokens)),
            Err(reason) => {
                warn!(identity = %identity.redacted(), reason = %reason, "Stored tokens are corrupted, deleting");
                if let Err(delete_err) = self.secure_store.delete_secret(&key).await {
                    warn!(identity = %identity.redacted(), error = %delete_err, "Failed to delete corrupted tokens");
                }
                Err(AuthError::TokenCorrupted {
                    identity: identity.redacted(),
                    reason,
                })
            }
        }
    }

    /// Idempotent.
    pub async fn delete_tokens(&self, identity: &Identity) -> Result<()> {
        self.secure_store
            .delete_secret(&storage_key(identity))
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;

        info!(identity = %identity.redacted(), "Tokens deleted");
        Ok(())
    }

    pub async fn has_tokens(&self, identity: &Identity) -> Result<bool> {
        self.secure_store
            .has_secret(&storage_key(identity))
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }

    /// Every identity with stored tokens.
    pub async fn list_identities(&self) -> Result<Vec<Identity>> {
        let keys = self
            .secure_store
            .list_keys()
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(KEY_PREFIX)
                    .and_then(|raw| Identity::parse(raw).ok())
            })
            .collect())
    }
}

fn storage_key(identity: &Identity) -> String {
    format!("{}{}", KEY_PREFIX, identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockSecureStore {
        storage: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> bridge_traits::error::Result<()> {
            self.storage
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> bridge_traits::error::Result<Option<Vec<u8>>> {
            Ok(self.storage.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> bridge_traits::error::Result<Vec<String>> {
            Ok(self.storage.lock().await.keys().cloned().collect())
        }

        async fn clear_all(&self) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.clear();
            Ok(())
        }
    }

    fn identity(value: &str) -> Identity {
        Identity::parse(value).unwrap()
    }

    fn tokens(access: &str, refresh: Option<&str>) -> OAuthTokens {
        OAuthTokens::new(
            access.to_string(),
            refresh.map(String::from),
            Utc.timestamp_opt(1_800_000_000, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_store_and_retrieve_tokens() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        let user = identity("user@example.com");

        store.store_tokens(&user, &tokens("a1", Some("r1"))).await.unwrap();

        let loaded = store.retrieve_tokens(&user).await.unwrap().unwrap();
        assert_eq!(loaded, tokens("a1", Some("r1")));
        assert!(store.has_tokens(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_retrieve_missing_tokens() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        assert!(store
            .retrieve_tokens(&identity("nobody@example.com"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        let alice = identity("alice@example.com");
        let bob = identity("bob@example.com");

        store.store_tokens(&alice, &tokens("alice", None)).await.unwrap();
        store.store_tokens(&bob, &tokens("bob", None)).await.unwrap();
        store.store_tokens(&alice, &tokens("alice2", None)).await.unwrap();

        assert_eq!(
            store.retrieve_tokens(&alice).await.unwrap().unwrap().access_token,
            "alice2"
        );
        assert_eq!(
            store.retrieve_tokens(&bob).await.unwrap().unwrap().access_token,
            "bob"
        );

        let mut listed = store.list_identities().await.unwrap();
        listed.sort();
        assert_eq!(listed, vec![alice, bob]);
    }

    #[tokio::test]
    async fn test_delete_tokens_is_idempotent() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        let user = identity("user@example.com");

        store.store_tokens(&user, &tokens("a", None)).await.unwrap();
        store.delete_tokens(&user).await.unwrap();
        store.delete_tokens(&user).await.unwrap();

        assert!(!store.has_tokens(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupted_tokens_are_deleted() {
        let secure = MockSecureStore::default();
        secure
            .set_secret("oauth_tokens:user@example.com", b"{not json")
            .await
            .unwrap();
        let store = TokenStore::new(Arc::new(secure.clone()));
        let user = identity("user@example.com");

        assert!(matches!(
            store.retrieve_tokens(&user).await,
            Err(AuthError::TokenCorrupted { .. })
        ));
        assert!(store.retrieve_tokens(&user).await.unwrap().is_none());
    }
}
