//! Correlation state for the authorization redirect.
//!
//! The `state` parameter brings the identity back on the callback. Callers
//! still check it against the identity their session asked for. In signed
//! mode the value is
//!
//! ```text
//! <identity>.<expires_unix>.<base64url(HMAC-SHA256(secret, "<identity>.<expires_unix>"))>
//! ```
//!
//! so the identity is still readable while forgery and replay after expiry
//! are rejected. Identities may contain dots, so the value is split from the
//! right. Plain mode passes the identity through unchanged.

use crate::error::{AuthError, Result};
use crate::types::Identity;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bridge_traits::time::Clock;
use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
enum Mode {
    Signed { key: Vec<u8>, ttl: Duration },
    Plain,
}

/// Encodes identities into `state` values and resolves them back.
#[derive(Clone)]
pub struct CorrelationCodec {
    mode: Mode,
    clock: Arc<dyn Clock>,
}

impl CorrelationCodec {
    pub fn signed(secret: impl AsRef<[u8]>, ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let ttl = Duration::from_std(ttl)
            .map_err(|e| AuthError::Config(format!("State lifetime out of range: {}", e)))?;
        Ok(Self {
            mode: Mode::Signed {
                key: secret.as_ref().to_vec(),
                ttl,
            },
            clock,
        })
    }

    /// Identity-as-state, unsigned and without expiry.
    pub fn plain(clock: Arc<dyn Clock>) -> Self {
        Self {
            mode: Mode::Plain,
            clock,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.mode, Mode::Signed { .. })
    }

    /// Lifetime of an issued state; `None` in plain mode.
    pub fn ttl(&self) -> Option<Duration> {
        match &self.mode {
            Mode::Signed { ttl, .. } => Some(*ttl),
            Mode::Plain => None,
        }
    }

    pub fn encode(&self, identity: &Identity) -> Result<String> {
        match &self.mode {
            Mode::Plain => Ok(identity.to_string()),
            Mode::Signed { key, ttl } => {
                let expires = (self.clock.now() + *ttl).timestamp();
                let payload = format!("{}.{}", identity, expires);
                let signature = sign(key, &payload)?;
                Ok(format!("{}.{}", payload, signature))
            }
        }
    }

    /// Resolve a callback `state` to the identity it was issued for.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidState`] for malformed, forged or expired values and
    /// [`AuthError::InvalidIdentity`] for an empty identity.
    pub fn decode(&self, state: &str) -> Result<Identity> {
        let key = match &self.mode {
            Mode::Plain => return Identity::parse(state),
            Mode::Signed { key, .. } => key,
        };

        let mut parts = state.rsplitn(3, '.');
        let (Some(signature), Some(expires), Some(identity)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidState("malformed state".to_string()));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidState("malformed signature".to_string()))?;

        let payload = &state[..identity.len() + 1 + expires.len()];
        let mut mac = new_mac(key)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidState("signature mismatch".to_string()))?;

        let expires: i64 = expires
            .parse()
            .map_err(|_| AuthError::InvalidState("malformed expiry".to_string()))?;
        if self.clock.unix_timestamp() > expires {
            return Err(AuthError::InvalidState("state has expired".to_string()));
        }

        Identity::parse(identity)
    }
}

fn new_mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|e| AuthError::Config(format!("Invalid state secret: {}", e)))
}

fn sign(key: &[u8], payload: &str) -> Result<String> {
    let mut mac = new_mac(key)?;
    mac.update(payload.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;
    use chrono::{TimeZone, Utc};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn codec(clock: &ManualClock) -> CorrelationCodec {
        CorrelationCodec::signed(
            SECRET,
            std::time::Duration::from_secs(600),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    fn identity(value: &str) -> Identity {
        Identity::parse(value).unwrap()
    }

    #[test]
    fn test_signed_round_trip_with_dotted_identity() {
        let clock = clock();
        let codec = codec(&clock);
        let user = identity("first.last@mail.example.co.uk");

        let state = codec.encode(&user).unwrap();

        assert!(state.starts_with("first.last@mail.example.co.uk."));
        assert_eq!(codec.decode(&state).unwrap(), user);
    }

    #[test]
    fn test_tampered_identity_rejected() {
        let clock = clock();
        let codec = codec(&clock);
        let state = codec.encode(&identity("alice@example.com")).unwrap();

        let forged = state.replacen("alice", "mallory", 1);
        assert!(matches!(codec.decode(&forged), Err(AuthError::InvalidState(_))));
    }

    #[test]
    fn test_other_secret_rejected() {
        let clock = clock();
        let state = codec(&clock).encode(&identity("alice@example.com")).unwrap();

        let other = CorrelationCodec::signed(
            "another-secret-of-enough-length",
            std::time::Duration::from_secs(600),
            Arc::new(clock.clone()),
        )
        .unwrap();
        assert!(matches!(other.decode(&state), Err(AuthError::InvalidState(_))));
    }

    #[test]
    fn test_expired_state_rejected() {
        let clock = clock();
        let codec = codec(&clock);
        let state = codec.encode(&identity("alice@example.com")).unwrap();

        clock.advance(chrono::Duration::seconds(600));
        assert!(codec.decode(&state).is_ok());

        clock.advance(chrono::Duration::seconds(1));
        match codec.decode(&state) {
            Err(AuthError::InvalidState(reason)) => assert!(reason.contains("expired")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_states_rejected() {
        let clock = clock();
        let codec = codec(&clock);

        for state in ["", "alice@example.com", "a.b", "a.123.!!!", "a.notanumber.AAAA"] {
            assert!(
                matches!(codec.decode(state), Err(AuthError::InvalidState(_))),
                "accepted {:?}",
                state
            );
        }
    }

    #[test]
    fn test_plain_mode_is_identity() {
        let clock = clock();
        let codec = CorrelationCodec::plain(Arc::new(clock));
        let user = identity("bob@example.com");

        assert!(!codec.is_signed());
        assert_eq!(codec.encode(&user).unwrap(), "bob@example.com");
        assert_eq!(codec.decode("bob@example.com").unwrap(), user);
        assert!(matches!(codec.decode(""), Err(AuthError::InvalidIdentity(_))));
    }
}
