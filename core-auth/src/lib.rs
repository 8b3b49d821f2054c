//! # Authorization
//!
//! Per-identity OAuth 2.0 credentials for the upload workflow.
//!
//! ## Overview
//!
//! This crate decides whether an identity already holds a credential,
//! produces the provider authorization URL when it does not, and exchanges
//! the callback code for tokens. Tokens are persisted through the host's
//! [`SecureStore`](bridge_traits::storage::SecureStore) and refreshed on use.
//!
//! ## Features
//!
//! - Authorization code flow with offline access
//! - Signed, expiring correlation `state` values
//! - Refresh before expiry, serialized per identity
//! - Auth state event emission

pub mod error;
pub mod manager;
pub mod oauth;
pub mod service;
pub mod state;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use oauth::{OAuthConfig, OAuthFlowManager};
pub use service::AuthorizationService;
pub use state::CorrelationCodec;
pub use token_store::TokenStore;
pub use types::{AuthState, Identity, OAuthTokens};
