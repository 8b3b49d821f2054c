//! # Server Bridge Implementations
//!
//! Default implementations of the bridge traits for a server process:
//! - `HttpClient` using `reqwest`
//! - `SecureStore` as one file per key under a directory ([`FileSecureStore`])
//! - `SecureStore` held in memory ([`MemorySecureStore`]) for tests and
//!   ephemeral deployments
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileSecureStore, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let store = FileSecureStore::open("token_store").await?;
//!     Ok(())
//! }
//! ```

mod http;
mod secure_store;

pub use http::ReqwestHttpClient;
pub use secure_store::{FileSecureStore, MemorySecureStore};
