//! Remote storage abstraction
//!
//! The contract between the upload workflow and whatever service ultimately
//! receives the bytes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single file handed to remote storage.
#[derive(Clone)]
pub struct UploadPayload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadPayload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPayload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Descriptor of an object accepted by remote storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Remote storage service
///
/// `account` is the identity whose credential authorizes the upload.
/// Implementations obtain that credential themselves (see [`TokenProvider`])
/// and may refresh it transparently before use.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn upload(&self, account: &str, payload: UploadPayload) -> Result<StoredObject>;
}

/// Source of live access tokens for an identity.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return an access token valid for immediate use, refreshing it first if
    /// it is about to expire.
    async fn access_token(&self, account: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_debug_hides_bytes() {
        let payload = UploadPayload::new("a.txt", "text/plain", Bytes::from_static(b"secret"));
        let debug = format!("{:?}", payload);

        assert!(debug.contains("a.txt"));
        assert!(debug.contains("len: 6"));
        assert!(!debug.contains("secret"));
    }
}
