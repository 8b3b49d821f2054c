//! Google Drive upload connector
//!
//! Implements `RemoteStorage` with the Drive API v3 multipart upload.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::remote::{RemoteStorage, StoredObject, TokenProvider, UploadPayload};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::mime::resolve_mime_type;
use crate::types::{ApiErrorResponse, DriveFile, FileMetadata};

/// Google Drive upload API base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields to request for the created file
const FILE_FIELDS: &str = "id,name,size,createdTime";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Google Drive upload connector
///
/// Each call uploads one file for one identity. The access token is fetched
/// from the [`TokenProvider`] right before the request, so an expired
/// credential is refreshed transparently. Failures are returned as is; there
/// is no retry.
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveUploader;
/// use bridge_traits::remote::{RemoteStorage, UploadPayload};
///
/// let uploader = GoogleDriveUploader::new(http_client, auth_manager);
/// let stored = uploader
///     .upload("user@example.com", UploadPayload::new("notes.txt", "text/plain", bytes))
///     .await?;
/// ```
pub struct GoogleDriveUploader {
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<dyn TokenProvider>,
    api_base: String,
}

impl GoogleDriveUploader {
    pub fn new(http_client: Arc<dyn HttpClient>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http_client,
            tokens,
            api_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Point the connector at another endpoint, e.g. a local stub.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/files?uploadType=multipart&fields={}",
            self.api_base, FILE_FIELDS
        )
    }

    /// Parse RFC 3339 timestamp
    fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(rfc3339)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Convert DriveFile to StoredObject
    fn convert_file(drive_file: DriveFile) -> StoredObject {
        StoredObject {
            id: drive_file.id,
            name: drive_file.name,
            size: drive_file.size.and_then(|s| s.parse().ok()),
            created_at: drive_file
                .created_time
                .as_deref()
                .and_then(Self::parse_timestamp),
        }
    }

    fn error_for(response: &HttpResponse) -> GoogleDriveError {
        let message = response
            .json::<ApiErrorResponse>()
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string());

        if response.status == 401 {
            GoogleDriveError::AuthenticationFailed(message)
        } else {
            GoogleDriveError::ApiError {
                status_code: response.status,
                message,
            }
        }
    }
}

/// `multipart/related` body: JSON metadata part followed by the content part.
fn multipart_body(boundary: &str, metadata: &[u8], mime_type: &str, content: &[u8]) -> Bytes {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    Bytes::from(body)
}

#[async_trait]
impl RemoteStorage for GoogleDriveUploader {
    #[instrument(skip(self, account, payload), fields(file_name = %payload.file_name, size = payload.len()))]
    async fn upload(&self, account: &str, payload: UploadPayload) -> Result<StoredObject> {
        let access_token = self.tokens.access_token(account).await?;

        let mime_type = resolve_mime_type(&payload.file_name, &payload.mime_type);
        let metadata = serde_json::to_vec(&FileMetadata {
            name: &payload.file_name,
            mime_type: &mime_type,
        })
        .map_err(|e| GoogleDriveError::ParseError(format!("Failed to encode metadata: {}", e)))?;

        let boundary = format!("cloudsync-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &metadata, &mime_type, &payload.bytes);

        debug!(mime_type = %mime_type, "Uploading file to Google Drive");

        let request = HttpRequest::new(HttpMethod::Post, self.upload_url())
            .bearer_token(access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", boundary),
            )
            .header("Accept", "application/json")
            .body(body)
            .timeout(UPLOAD_TIMEOUT);

        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            let error = Self::error_for(&response);
            warn!(status = response.status, error = %error, "Upload rejected");
            return Err(error.into());
        }

        let drive_file: DriveFile = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse upload response: {}", e))
        })?;

        let stored = Self::convert_file(drive_file);
        info!(file_id = %stored.id, "Uploaded file to Google Drive");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::HttpResponse;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    mock! {
        Tokens {}

        #[async_trait]
        impl TokenProvider for Tokens {
            async fn access_token(&self, account: &str) -> Result<String>;
        }
    }

    fn tokens_for(expected_account: &'static str) -> Arc<MockTokens> {
        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .withf(move |account| account.to_string() == expected_account)
            .returning(|_| Ok("ya29.test".to_string()));
        Arc::new(tokens)
    }

    fn response(status: u16, body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn payload() -> UploadPayload {
        UploadPayload::new("notes.txt", "", Bytes::from_static(b"hello drive"))
    }

    #[test]
    fn test_convert_file() {
        let stored = GoogleDriveUploader::convert_file(DriveFile {
            id: "file123".to_string(),
            name: "notes.txt".to_string(),
            size: Some("11".to_string()),
            created_time: Some("2024-01-01T10:30:00.000Z".to_string()),
        });

        assert_eq!(stored.id, "file123");
        assert_eq!(stored.size, Some(11));
        assert_eq!(
            stored.created_at.map(|t| t.timestamp()),
            Some(1_704_105_000)
        );
    }

    #[test]
    fn test_convert_file_tolerates_bad_fields() {
        let stored = GoogleDriveUploader::convert_file(DriveFile {
            id: "x".to_string(),
            name: "y".to_string(),
            size: Some("not-a-number".to_string()),
            created_time: Some("yesterday".to_string()),
        });

        assert_eq!(stored.size, None);
        assert_eq!(stored.created_at, None);
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("b0", br#"{"name":"a"}"#, "text/plain", b"data");
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert_eq!(
            text,
            "--b0\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a\"}\r\n--b0\r\nContent-Type: text/plain\r\n\r\ndata\r\n--b0--\r\n"
        );
    }

    #[tokio::test]
    async fn test_upload_success() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert!(matches!(req.method, HttpMethod::Post));
            assert!(req.url.starts_with(DRIVE_UPLOAD_BASE));
            assert!(req.url.contains("uploadType=multipart"));
            assert!(req.url.contains("fields=id,name,size,createdTime"));
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Bearer ya29.test")
            );
            assert!(req.headers["Content-Type"].starts_with("multipart/related; boundary="));

            let body = String::from_utf8(req.body.unwrap().to_vec()).unwrap();
            assert!(body.contains(r#"{"name":"notes.txt","mimeType":"text/plain"}"#));
            assert!(body.contains("Content-Type: text/plain\r\n\r\nhello drive"));

            response(
                200,
                r#"{"id":"1AbC","name":"notes.txt","size":"11","createdTime":"2024-01-01T00:00:00Z"}"#,
            )
        });

        let uploader = GoogleDriveUploader::new(Arc::new(mock_http), tokens_for("user@example.com"));
        let stored = uploader.upload("user@example.com", payload()).await.unwrap();

        assert_eq!(stored.id, "1AbC");
        assert_eq!(stored.name, "notes.txt");
        assert_eq!(stored.size, Some(11));
        assert!(stored.created_at.is_some());
    }

    #[tokio::test]
    async fn test_upload_custom_api_base() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.starts_with("http://127.0.0.1:9999/files?"));
            response(200, r#"{"id":"1","name":"notes.txt"}"#)
        });

        let uploader = GoogleDriveUploader::new(Arc::new(mock_http), tokens_for("user@example.com"))
            .with_api_base("http://127.0.0.1:9999/");
        let stored = uploader.upload("user@example.com", payload()).await.unwrap();

        assert_eq!(stored.size, None);
    }

    #[tokio::test]
    async fn test_upload_unauthorized() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            response(401, r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
        });

        let uploader = GoogleDriveUploader::new(Arc::new(mock_http), tokens_for("user@example.com"));
        let err = uploader.upload("user@example.com", payload()).await.unwrap_err();

        assert!(matches!(err, BridgeError::Unauthorized(msg) if msg.contains("Invalid Credentials")));
    }

    #[tokio::test]
    async fn test_upload_api_error_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(503, "backend unavailable"));

        let uploader = GoogleDriveUploader::new(Arc::new(mock_http), tokens_for("user@example.com"));
        let err = uploader.upload("user@example.com", payload()).await.unwrap_err();

        assert!(matches!(err, BridgeError::OperationFailed(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_upload_without_credential_skips_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().never();

        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .returning(|account| Err(BridgeError::Unauthorized(format!("No stored credential for {}", account))));

        let uploader = GoogleDriveUploader::new(Arc::new(mock_http), Arc::new(tokens));
        let err = uploader.upload("nobody@example.com", payload()).await.unwrap_err();

        assert!(matches!(err, BridgeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_upload_malformed_response() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(200, "<html>"));

        let uploader = GoogleDriveUploader::new(Arc::new(mock_http), tokens_for("user@example.com"));
        let err = uploader.upload("user@example.com", payload()).await.unwrap_err();

        assert!(matches!(err, BridgeError::OperationFailed(msg) if msg.contains("Parse error")));
    }
}
