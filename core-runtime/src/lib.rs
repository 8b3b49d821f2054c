//! # Core Runtime
//!
//! Runtime infrastructure shared by every other crate:
//! - Configuration ([`config::ServiceConfig`])
//! - Logging and tracing setup ([`logging`])
//! - Event bus ([`events::EventBus`])

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
