//! Google Drive API response types

use serde::{Deserialize, Serialize};

/// Metadata part of a multipart upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
}

/// Google Drive API file resource, as returned for
/// `fields=id,name,size,createdTime`
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    pub name: String,

    /// File size in bytes, as a decimal string
    #[serde(default)]
    pub size: Option<String>,

    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_time: Option<String>,
}

/// Error envelope of Google APIs
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}
