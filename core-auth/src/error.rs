use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid authorization state: {0}")]
    InvalidState(String),

    #[error("Authorization code exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No stored credential for {0}")]
    NotAuthenticated(String),

    #[error("Stored credential for {identity} is corrupted: {reason}")]
    TokenCorrupted { identity: String, reason: String },

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Operation timed out: {operation}")]
    OperationTimeout { operation: String },

    #[error("OAuth configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl From<AuthError> for BridgeError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotAuthenticated(_)
            | AuthError::TokenRefreshFailed(_)
            | AuthError::TokenCorrupted { .. } => BridgeError::Unauthorized(error.to_string()),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
