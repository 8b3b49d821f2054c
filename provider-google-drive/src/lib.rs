//! # Google Drive Provider
//!
//! Implements [`RemoteStorage`](bridge_traits::remote::RemoteStorage) for the
//! Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Multipart upload of one file per call (`uploadType=multipart`)
//! - Access tokens obtained per identity through a
//!   [`TokenProvider`](bridge_traits::remote::TokenProvider), refreshed on use
//! - MIME type resolution from the declared content type or the file extension

pub mod connector;
pub mod error;
pub mod mime;
pub mod types;

pub use connector::GoogleDriveUploader;
pub use error::{GoogleDriveError, Result};
pub use mime::{resolve_mime_type, DEFAULT_MIME_TYPE};
