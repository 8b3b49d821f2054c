//! JSON endpoints and the authorization callback.

use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use core_upload::{
    file_basename, AuthorizeResponse, CallbackParams, PendingFile, RedirectTarget, UploadError,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::ApiError;
use crate::pages;
use crate::session::Session;
use crate::state::AppState;

const UPLOAD_FAILED: &str = "An error occurred during file upload. Please try again.";

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default)]
    pub email: String,
}

/// `POST /upload`: stage every `files` part under the caller's session.
#[instrument(skip(state, multipart), fields(session_id = %session.0))]
pub async fn upload(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read multipart body");
                return Err(ApiError::Internal(UPLOAD_FAILED.to_string()));
            }
        };

        let Some(file_name) = field
            .file_name()
            .map(file_basename)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_string();

        let bytes = field.bytes().await.map_err(|e| {
            error!(error = %e, file_name = %file_name, "Failed to read file data");
            ApiError::Internal(UPLOAD_FAILED.to_string())
        })?;

        files.push(PendingFile::new(file_name, content_type, bytes));
    }

    match state.orchestrator.stage_files(&session.0, files).await {
        Ok(count) => {
            info!(count, "Files uploaded successfully. Please proceed with authorization.");
            Ok(Json(MessageResponse {
                message: "Files uploaded successfully. Please proceed with authorization.".to_string(),
            }))
        }
        Err(UploadError::Validation(message)) => Err(ApiError::BadRequest(message)),
        Err(e) => {
            error!(error = %e, "Error occurred during file upload");
            Err(ApiError::Internal(UPLOAD_FAILED.to_string()))
        }
    }
}

/// `POST /authorize`: flush now or hand back the provider URL.
#[instrument(skip(state, request), fields(session_id = %session.0))]
pub async fn authorize(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<AuthorizationRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    state
        .orchestrator
        .authorize(&session.0, &request.email)
        .await
        .map(Json)
        .map_err(|e| match e {
            UploadError::Validation(message) => ApiError::BadRequest(message),
            other => ApiError::Internal(format!(
                "An error occurred during authorization: {}",
                other
            )),
        })
}

/// `GET /auth/callback`: provider redirect target.
#[instrument(skip(state, params), fields(session_id = %session.0))]
pub async fn auth_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.orchestrator.handle_callback(&session.0, params).await {
        RedirectTarget::Success => Redirect::to("/success").into_response(),
        RedirectTarget::Error { correlation_id, .. } => {
            pages::error_page(&correlation_id).into_response()
        }
    }
}

/// `POST /signout`: discard the session and revoke the credential it
/// signed in with.
#[instrument(skip(state), fields(session_id = %session.0))]
pub async fn sign_out(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(identity) = state.orchestrator.end_session(&session.0).await else {
        return Ok(Json(MessageResponse {
            message: "No account is signed in.".to_string(),
        }));
    };

    state.auth.sign_out(&identity).await.map_err(|e| {
        error!(error = %e, "Sign-out failed");
        ApiError::Internal("An error occurred during sign-out.".to_string())
    })?;

    Ok(Json(MessageResponse {
        message: "Signed out.".to_string(),
    }))
}
