//! HTTP surface of the staged upload service.
//!
//! Wires the server-side bridges (reqwest, file-backed credential store)
//! into the authorization and upload crates and exposes them through axum:
//!
//! | Route | |
//! |-------|-|
//! | `GET /` | drop zone |
//! | `GET /auth` | email form |
//! | `GET /success` | confirmation |
//! | `POST /upload` | stage files (multipart, field `files`) |
//! | `POST /authorize` | `{email}` to `{isAuthenticated, authUrl?}` |
//! | `GET /auth/callback` | provider redirect |
//! | `POST /signout` | drop the session's files and its credential |

pub mod error;
pub mod handlers;
pub mod pages;
pub mod router;
pub mod session;
pub mod state;

pub use error::{ApiError, Result, ServiceError};
pub use router::build_router;
pub use session::{Session, SESSION_COOKIE};
pub use state::{AppState, Bridges};
