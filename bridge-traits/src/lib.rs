//! # Host Bridge Traits
//!
//! Contracts between the upload workflow and its external collaborators.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP for the OAuth token endpoint and storage APIs
//! - [`SecureStore`](storage::SecureStore) - Credential persistence, keyed by identity
//! - [`RemoteStorage`](remote::RemoteStorage) - Accepts one file for an authorized identity
//! - [`TokenProvider`](remote::TokenProvider) - Live access tokens, refreshed on use
//! - [`Clock`](time::Clock) - Time source for deterministic expiry tests
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to an external pipeline
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters convert
//! their own errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; implementations are shared across
//! request handlers behind `Arc`.

pub mod error;
pub mod http;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use remote::{RemoteStorage, StoredObject, TokenProvider, UploadPayload};
pub use storage::SecureStore;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
