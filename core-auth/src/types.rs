use crate::error::{AuthError, Result};
use chrono::{DateTime, Duration, Utc};
use core_runtime::logging::redact_if_sensitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The key a user is known by across staging, authorization and storage.
///
/// Any non-empty string is accepted and used verbatim; in practice it is an
/// email address. No case folding or trimming is applied.
///
/// # Examples
///
/// ```
/// use core_auth::Identity;
///
/// let identity = Identity::parse("user@example.com").unwrap();
/// assert_eq!(identity.as_str(), "user@example.com");
/// assert!(Identity::parse("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(AuthError::InvalidIdentity(
                "identity cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Masked form for log fields, e.g. `u***@[REDACTED]`.
    pub fn redacted(&self) -> String {
        redact_if_sensitive("identity", &self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

/// OAuth 2.0 token set.
///
/// The `Debug` implementation redacts both tokens.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let tokens = OAuthTokens::issued_at(now, "ya29.a0".into(), Some("1//0g".into()), 3600);
///
/// assert!(!tokens.is_expired_at(now, 300));
/// assert!(tokens.is_expired_at(now + Duration::minutes(56), 300));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Absent when the provider did not grant offline access
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Token set whose access token lives `expires_in` seconds from `now`.
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
    ) -> Self {
        Self::new(access_token, refresh_token, now + Duration::seconds(expires_in))
    }

    /// `true` when the access token expires within `buffer_seconds` of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer_seconds: i64) -> bool {
        now >= self.expires_at - Duration::seconds(buffer_seconds)
    }

    /// The token set carries something usable: a non-empty access token that
    /// is either still live or can be refreshed.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        !self.is_expired_at(now, 0) || self.can_refresh()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map_or(false, |token| !token.is_empty())
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Authorization state of one identity.
///
/// ```text
/// Unauthenticated -> PendingCallback -> Authenticated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    /// An authorization URL was issued and the callback has not arrived
    PendingCallback,
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Unauthenticated => write!(f, "Unauthenticated"),
            AuthState::PendingCallback => write!(f, "Pending callback"),
            AuthState::Authenticated => write!(f, "Authenticated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_identity_is_verbatim() {
        let identity = Identity::parse(" User@Example.com").unwrap();
        assert_eq!(identity.as_str(), " User@Example.com");
        assert_eq!(identity.to_string(), " User@Example.com");
    }

    #[test]
    fn test_identity_redacted_for_logs() {
        let identity = Identity::parse("user@example.com").unwrap();
        assert_eq!(identity.redacted(), "u***@[REDACTED]");
        assert!(!identity.redacted().contains("example.com"));
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert!(matches!(
            Identity::parse(""),
            Err(AuthError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_identity_serde_validates() {
        let identity: Identity = serde_json::from_str("\"a@b.c\"").unwrap();
        assert_eq!(identity.as_str(), "a@b.c");
        assert_eq!(serde_json::to_string(&identity).unwrap(), "\"a@b.c\"");

        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }

    #[test]
    fn test_token_expiry_with_buffer() {
        let tokens = OAuthTokens::issued_at(noon(), "a".into(), None, 600);

        assert!(!tokens.is_expired_at(noon(), 300));
        assert!(!tokens.is_expired_at(noon() + Duration::seconds(299), 300));
        assert!(tokens.is_expired_at(noon() + Duration::seconds(300), 300));
        assert!(tokens.is_expired_at(noon() + Duration::seconds(600), 0));
    }

    #[test]
    fn test_token_usability() {
        let live = OAuthTokens::issued_at(noon(), "a".into(), None, 3600);
        assert!(live.is_usable_at(noon()));

        let expired_no_refresh = OAuthTokens::issued_at(noon(), "a".into(), None, 60);
        assert!(!expired_no_refresh.is_usable_at(noon() + Duration::hours(1)));

        let expired_refreshable =
            OAuthTokens::issued_at(noon(), "a".into(), Some("r".into()), 60);
        assert!(expired_refreshable.is_usable_at(noon() + Duration::hours(1)));

        let empty = OAuthTokens::issued_at(noon(), String::new(), Some("r".into()), 3600);
        assert!(!empty.is_usable_at(noon()));

        let blank_refresh = OAuthTokens::issued_at(noon(), "a".into(), Some(String::new()), 60);
        assert!(!blank_refresh.can_refresh());
    }

    #[test]
    fn test_tokens_debug_redacted() {
        let tokens = OAuthTokens::issued_at(noon(), "ya29.secret".into(), Some("1//r".into()), 60);
        let debug = format!("{:?}", tokens);

        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("1//r"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_auth_state() {
        assert_eq!(AuthState::default(), AuthState::Unauthenticated);
        assert!(AuthState::Authenticated.is_authenticated());
        assert!(!AuthState::PendingCallback.is_authenticated());
        assert_eq!(AuthState::PendingCallback.to_string(), "Pending callback");
    }
}
