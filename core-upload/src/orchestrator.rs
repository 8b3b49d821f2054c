//! # Upload Orchestrator
//!
//! Ties staging, authorization and remote storage together.
//!
//! ## Workflow
//!
//! 1. `stage_files` holds the browser's files under its session
//! 2. `authorize` checks the identity's credential
//!    - authorized: flush the session's files right away
//!    - otherwise: remember the identity on the session, return the
//!      provider authorization URL
//! 3. `handle_callback` exchanges the code, then flushes
//! 4. `end_session` discards whatever is left and releases the identity
//!
//! `flush` uploads each file on its own; a failed file is recorded in the
//! report and the next one is still attempted. Nothing is retried.

use bridge_traits::remote::{RemoteStorage, StoredObject};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_auth::{AuthError, AuthorizationService, Identity};
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, UploadError};
use crate::staging::{PendingFile, SessionId, StagingArea};

/// Answer to an authorize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    /// Result of the immediate flush for an authorized identity
    #[serde(skip)]
    pub flush: Option<FlushReport>,
}

/// Query parameters of the provider redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

/// Where the browser goes after the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Success,
    Error {
        correlation_id: String,
        message: String,
    },
}

impl RedirectTarget {
    pub fn is_success(&self) -> bool {
        matches!(self, RedirectTarget::Success)
    }
}

/// Result of delivering one staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub staged_file_name: String,
    pub success: bool,
    pub remote: Option<StoredObject>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub all_succeeded: bool,
    pub outcomes: Vec<UploadOutcome>,
}

impl FlushReport {
    fn from_outcomes(outcomes: Vec<UploadOutcome>) -> Self {
        Self {
            all_succeeded: outcomes.iter().all(|o| o.success),
            outcomes,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Identity a session is working with.
#[derive(Debug, Clone)]
struct SessionBinding {
    identity: Identity,
    /// `false` while the callback is outstanding
    authorized: bool,
    since: DateTime<Utc>,
}

pub struct UploadOrchestrator {
    staging: Arc<StagingArea>,
    auth: Arc<dyn AuthorizationService>,
    storage: Arc<dyn RemoteStorage>,
    event_bus: EventBus,
    bindings: RwLock<HashMap<SessionId, SessionBinding>>,
}

impl UploadOrchestrator {
    pub fn new(
        staging: Arc<StagingArea>,
        auth: Arc<dyn AuthorizationService>,
        storage: Arc<dyn RemoteStorage>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            staging,
            auth,
            storage,
            event_bus,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn staging(&self) -> &Arc<StagingArea> {
        &self.staging
    }

    /// Stage the non-empty files among `files`, in order.
    ///
    /// # Errors
    ///
    /// [`UploadError::Validation`] when no file has content.
    #[instrument(skip(self, files), fields(session_id = %session, received = files.len()))]
    pub async fn stage_files(&self, session: &SessionId, files: Vec<PendingFile>) -> Result<usize> {
        let mut staged = 0;
        for file in files {
            if file.bytes.is_empty() {
                debug!(file_name = %file.file_name, "Skipping empty file");
                continue;
            }

            let file_name = file.file_name.clone();
            let size = file.bytes.len() as u64;
            let position = self.staging.stage(session, file).await;
            staged += 1;

            let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::FileStaged {
                session_id: session.to_string(),
                file_name,
                position,
                size,
            }));
        }

        if staged == 0 {
            return Err(UploadError::Validation("No files uploaded.".to_string()));
        }

        info!(staged, "Files staged");
        Ok(staged)
    }

    /// Check `identity` and either flush now or start authorization.
    ///
    /// # Errors
    ///
    /// [`UploadError::Validation`] for an empty identity,
    /// [`UploadError::Orchestration`] when the credential store or provider
    /// configuration fails.
    #[instrument(skip(self, identity), fields(session_id = %session))]
    pub async fn authorize(&self, session: &SessionId, identity: &str) -> Result<AuthorizeResponse> {
        let identity = Identity::parse(identity)
            .map_err(|_| UploadError::Validation("An email address is required.".to_string()))?;

        let authenticated = self
            .auth
            .check_authenticated(&identity)
            .await
            .map_err(|e| UploadError::Orchestration(e.to_string()))?;

        if authenticated {
            info!(identity = %identity.redacted(), "Identity already authorized, flushing");
            self.bind(session, &identity, true).await;
            let report = self.flush(session, &identity).await;
            return Ok(AuthorizeResponse {
                is_authenticated: true,
                auth_url: None,
                flush: Some(report),
            });
        }

        let url = self
            .auth
            .begin_authorization(&identity)
            .await
            .map_err(|e| UploadError::Orchestration(e.to_string()))?;

        self.bind(session, &identity, false).await;

        info!(identity = %identity.redacted(), "Authorization required");
        Ok(AuthorizeResponse {
            is_authenticated: false,
            auth_url: Some(url),
            flush: None,
        })
    }

    /// Finish the provider redirect. Never fails: every fault becomes an
    /// error target carrying a correlation id.
    #[instrument(skip(self, params), fields(session_id = %session))]
    pub async fn handle_callback(&self, session: &SessionId, params: CallbackParams) -> RedirectTarget {
        if let Some(provider_error) = params.error.as_deref().filter(|e| !e.is_empty()) {
            return error_target(format!("Authorization was not granted: {}", provider_error));
        }

        match self.complete_callback(session, params).await {
            Ok(report) => {
                info!(
                    succeeded = report.succeeded(),
                    failed = report.failed(),
                    "Callback completed"
                );
                RedirectTarget::Success
            }
            Err(e) => error_target(e.to_string()),
        }
    }

    async fn complete_callback(&self, session: &SessionId, params: CallbackParams) -> Result<FlushReport> {
        let identity = self.callback_identity(session, params.state.as_deref()).await?;

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| UploadError::Validation("The authorization code is missing.".to_string()))?;

        self.auth
            .complete_authorization(&code, &identity)
            .await
            .map_err(|e| match e {
                AuthError::SecureStorageUnavailable(_) | AuthError::SerializationFailed(_) => {
                    UploadError::Orchestration(e.to_string())
                }
                other => UploadError::TokenExchange(other.to_string()),
            })?;

        self.bind(session, &identity, true).await;
        Ok(self.flush(session, &identity).await)
    }

    /// The identity this session is authorizing. A `state` must name the
    /// identity the same session passed to `authorize`, so a callback link
    /// issued to another session cannot flush this one.
    async fn callback_identity(&self, session: &SessionId, state: Option<&str>) -> Result<Identity> {
        let pending = self.pending_identity(session).await;

        let Some(state) = state.filter(|s| !s.is_empty()) else {
            return pending.ok_or(UploadError::MissingIdentity);
        };

        let identity = self.auth.resolve_state(state).map_err(|e| {
            warn!(error = %e, "Rejected callback state");
            UploadError::MissingIdentity
        })?;

        if pending.as_ref() != Some(&identity) {
            warn!(
                identity = %identity.redacted(),
                "Callback state was not issued to this session"
            );
            return Err(UploadError::SessionMismatch);
        }
        Ok(identity)
    }

    /// Identity recorded on the session by the last unauthenticated
    /// `authorize`, until its callback succeeds.
    pub async fn pending_identity(&self, session: &SessionId) -> Option<Identity> {
        self.bindings
            .read()
            .await
            .get(session)
            .filter(|binding| !binding.authorized)
            .map(|binding| binding.identity.clone())
    }

    /// Identity this session completed authorization for.
    pub async fn signed_in_identity(&self, session: &SessionId) -> Option<Identity> {
        self.bindings
            .read()
            .await
            .get(session)
            .filter(|binding| binding.authorized)
            .map(|binding| binding.identity.clone())
    }

    /// Forget the session: its staged files are discarded and its identity
    /// binding removed. Returns the identity the session had signed in, if
    /// any, so its credential can be revoked.
    #[instrument(skip(self), fields(session_id = %session))]
    pub async fn end_session(&self, session: &SessionId) -> Option<Identity> {
        self.staging.discard(session).await;
        let binding = self.bindings.write().await.remove(session)?;
        info!(identity = %binding.identity.redacted(), "Session ended");
        binding.authorized.then_some(binding.identity)
    }

    async fn bind(&self, session: &SessionId, identity: &Identity, authorized: bool) {
        let since = self.staging.clock().now();
        self.bindings.write().await.insert(
            *session,
            SessionBinding {
                identity: identity.clone(),
                authorized,
                since,
            },
        );
    }

    /// Drain the session and upload every file for `identity`, in stage
    /// order. An empty session is a success with no outcomes.
    #[instrument(skip(self, identity), fields(session_id = %session, identity = %identity.redacted()))]
    pub async fn flush(&self, session: &SessionId, identity: &Identity) -> FlushReport {
        let files = self.staging.drain_all(session).await;
        if files.is_empty() {
            debug!("Nothing staged");
            return FlushReport::from_outcomes(Vec::new());
        }

        let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::FlushStarted {
            session_id: session.to_string(),
            identity: identity.to_string(),
            file_count: files.len(),
        }));

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let staged_file_name = file.original_name().to_string();

            match self.storage.upload(identity.as_str(), file.into_payload()).await {
                Ok(stored) => {
                    info!(file_name = %staged_file_name, file_id = %stored.id, "File uploaded");
                    let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::FileUploaded {
                        identity: identity.to_string(),
                        file_name: staged_file_name.clone(),
                        remote_id: stored.id.clone(),
                    }));
                    outcomes.push(UploadOutcome {
                        staged_file_name,
                        success: true,
                        remote: Some(stored),
                        error: None,
                    });
                }
                Err(e) => {
                    let failure = UploadError::Upload {
                        file_name: staged_file_name.clone(),
                        message: e.to_string(),
                    };
                    error!(error = %failure, "File upload failed");
                    let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::FileFailed {
                        identity: identity.to_string(),
                        file_name: staged_file_name.clone(),
                        message: e.to_string(),
                    }));
                    outcomes.push(UploadOutcome {
                        staged_file_name,
                        success: false,
                        remote: None,
                        error: Some(failure.to_string()),
                    });
                }
            }
        }

        let report = FlushReport::from_outcomes(outcomes);
        let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::FlushCompleted {
            identity: identity.to_string(),
            succeeded: report.succeeded(),
            failed: report.failed(),
        }));
        report
    }

    /// Drop idle staging sessions and stale pending identities, here and in
    /// the authorization service.
    pub async fn purge_expired(&self) -> usize {
        let purged_auth = self.auth.purge_expired().await;
        let purged = self.staging.purge_expired().await;
        let now = self.staging.clock().now();
        let idle_timeout = self.staging.idle_timeout();

        let mut bindings = self.bindings.write().await;
        let before = bindings.len();
        bindings.retain(|session, binding| {
            !purged.contains(session) && now - binding.since <= idle_timeout
        });

        purged.len() + (before - bindings.len()) + purged_auth
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Staging sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = self.purge_expired().await;
                        if purged > 0 {
                            debug!(purged, "Sweeper pass");
                        }
                    }
                }
            }
        })
    }
}

fn error_target(message: String) -> RedirectTarget {
    let correlation_id = Uuid::new_v4().to_string();
    error!(correlation_id = %correlation_id, message = %message, "Authorization callback failed");
    RedirectTarget::Error {
        correlation_id,
        message,
    }
}
