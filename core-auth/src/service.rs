use crate::error::Result;
use crate::types::Identity;
use async_trait::async_trait;

/// Decides whether an identity holds a credential and drives the
/// authorization code flow for identities that do not.
///
/// The upload workflow depends only on this trait, so it can be exercised
/// against an in-memory fake.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// `true` iff a non-empty, structurally valid credential is stored.
    ///
    /// Does not contact the provider and does not refresh.
    async fn check_authenticated(&self, identity: &Identity) -> Result<bool>;

    /// Provider authorization URL whose `state` parameter carries `identity`.
    async fn begin_authorization(&self, identity: &Identity) -> Result<String>;

    /// Exchange `code` for tokens and persist them under `identity`.
    async fn complete_authorization(&self, code: &str, identity: &Identity) -> Result<()>;

    /// Recover the identity carried by a callback `state` value.
    fn resolve_state(&self, state: &str) -> Result<Identity>;

    /// Forget authorizations whose callback can no longer arrive. Returns
    /// how many were dropped.
    async fn purge_expired(&self) -> usize {
        0
    }
}
