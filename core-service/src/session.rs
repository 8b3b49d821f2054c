//! Browser session cookie.
//!
//! [`session_layer`] resolves the `cloudsync_session` cookie into a
//! [`SessionId`] request extension, minting a new id (and setting the cookie
//! on the response) when the browser has none. Handlers take [`Session`].

use axum::extract::{FromRequestParts, Request};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use core_upload::SessionId;
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "cloudsync_session";

/// The caller's session.
#[derive(Debug, Clone, Copy)]
pub struct Session(pub SessionId);

pub async fn session_layer(mut request: Request, next: Next) -> Response {
    let existing = session_from_headers(request.headers());
    let session = existing.unwrap_or_default();
    request.extensions_mut().insert(Session(session));

    let mut response = next.run(request).await;

    if existing.is_none() {
        debug!(session_id = %session, "New browser session");
        let cookie = format!(
            "{}={}; HttpOnly; Path=/; SameSite=Lax",
            SESSION_COOKIE, session
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Could not encode session cookie"),
        }
    }
    response
}

fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionId::parse(value).ok())
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .copied()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session layer missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_headers() {
        let id = SessionId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, id)).unwrap(),
        );

        assert_eq!(session_from_headers(&headers), Some(id));
    }

    #[test]
    fn test_invalid_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("cloudsync_session=not-a-uuid"),
        );

        assert_eq!(session_from_headers(&headers), None);
        assert_eq!(session_from_headers(&HeaderMap::new()), None);
    }
}
