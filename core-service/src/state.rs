//! Application state and its assembly from configuration.

use bridge_desktop::{FileSecureStore, ReqwestHttpClient};
use bridge_traits::http::HttpClient;
use bridge_traits::storage::SecureStore;
use bridge_traits::time::{Clock, SystemClock};
use core_auth::{AuthManager, CorrelationCodec, OAuthConfig, OAuthFlowManager, TokenStore};
use core_runtime::config::ServiceConfig;
use core_runtime::events::EventBus;
use core_upload::{StagingArea, UploadOrchestrator};
use provider_google_drive::GoogleDriveUploader;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, ServiceError};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
    pub auth: Arc<AuthManager>,
    pub max_upload_bytes: usize,
}

/// Collaborators the service is built from.
pub struct Bridges {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub clock: Arc<dyn Clock>,
    /// Overrides the Google Drive upload endpoint
    pub drive_api_base: Option<String>,
}

impl Bridges {
    /// Reqwest, the file-backed credential store and the system clock.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let store = FileSecureStore::open(&config.token_store_dir).await?;
        info!(dir = %config.token_store_dir.display(), "Credential store opened");

        Ok(Self {
            http_client: Arc::new(ReqwestHttpClient::new()?),
            secure_store: Arc::new(store),
            clock: Arc::new(SystemClock),
            drive_api_base: None,
        })
    }
}

impl AppState {
    pub fn build(config: &ServiceConfig, bridges: Bridges, event_bus: EventBus) -> Result<Self> {
        let codec = if config.state.trust_plain {
            warn!("Accepting unsigned authorization state");
            CorrelationCodec::plain(bridges.clock.clone())
        } else {
            let secret = config.state.secret.as_deref().ok_or_else(|| {
                ServiceError::Config(core_runtime::Error::Config(
                    "A state secret is required unless plain state is trusted".to_string(),
                ))
            })?;
            CorrelationCodec::signed(secret, config.state.ttl, bridges.clock.clone())?
        };

        let auth = Arc::new(AuthManager::new(
            TokenStore::new(bridges.secure_store),
            OAuthFlowManager::new(OAuthConfig::from(&config.oauth), bridges.http_client.clone()),
            codec,
            event_bus.clone(),
            bridges.clock.clone(),
        ));

        let mut uploader = GoogleDriveUploader::new(bridges.http_client, auth.clone());
        if let Some(api_base) = bridges.drive_api_base {
            uploader = uploader.with_api_base(api_base);
        }

        let staging = Arc::new(StagingArea::new(config.session_idle_timeout, bridges.clock));
        let orchestrator = Arc::new(UploadOrchestrator::new(
            staging,
            auth.clone(),
            Arc::new(uploader),
            event_bus,
        ));

        Ok(Self {
            orchestrator,
            auth,
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}
