//! # Staged Uploads
//!
//! Holds files uploaded by a browser session until the user's identity is
//! authorized, then delivers them to remote storage.
//!
//! - [`StagingArea`] keeps an ordered list of files per session
//! - [`UploadOrchestrator`] runs authorize, callback and flush

pub mod error;
pub mod orchestrator;
pub mod staging;

pub use error::{Result, UploadError};
pub use orchestrator::{
    AuthorizeResponse, CallbackParams, FlushReport, RedirectTarget, UploadOrchestrator,
    UploadOutcome,
};
pub use staging::{file_basename, PendingFile, SessionId, StagedFile, StagingArea};
