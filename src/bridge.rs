use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::auth::{OAuthController, TokenPhase, TokenStatus};
use crate::config::Settings;
use crate::credentials::CredentialStore;
use crate::detect::QueryRelay;
use crate::error::BridgeError;
use crate::intents::{IntentMap, IntentSyncEngine, ReplaceAll, SyncReport};
use crate::provider::{AgentClient, build_http_client};

/// The operations the router and the CLI call. Every call that needs a
/// bearer token fetches the most recently persisted one through the OAuth
/// controller rather than caching it here.
#[derive(Clone)]
pub struct Bridge {
    oauth: OAuthController,
    sync: Arc<IntentSyncEngine<ReplaceAll>>,
    relay: QueryRelay,
}

impl Bridge {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = CredentialStore::new(&settings.state_dir, settings.client_secret_path.clone());
        let credentials = store.load_client_credentials().with_context(|| {
            format!(
                "failed to load client credentials from {}",
                settings.client_secret_path.display()
            )
        })?;
        let http = build_http_client(settings.http_timeout);
        let agent = AgentClient::new(
            http.clone(),
            &settings.endpoints.api_base,
            &credentials.project_id,
        );

        info!(
            project = %credentials.project_id,
            token_file = %store.token_file().display(),
            list_failure = settings.list_failure.as_str(),
            "bridge configured"
        );

        Ok(Self {
            oauth: OAuthController::new(
                store,
                Arc::new(credentials),
                settings.endpoints.clone(),
                http,
            ),
            sync: Arc::new(IntentSyncEngine::new(
                agent.clone(),
                ReplaceAll {
                    list_failure: settings.list_failure,
                },
            )),
            relay: QueryRelay::new(agent, settings.detection.clone()),
        })
    }

    pub fn get_authorization_url(&self) -> Result<String, BridgeError> {
        self.oauth.authorization_url()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, BridgeError> {
        self.oauth.exchange_code(code).await
    }

    pub async fn is_token_valid(&self, token: Option<&str>) -> bool {
        self.oauth.validate_token(token).await
    }

    pub async fn authorize(&self) -> Result<TokenPhase, BridgeError> {
        self.oauth.authorize().await
    }

    pub async fn token_status(&self) -> TokenStatus {
        self.oauth.status().await
    }

    pub async fn sync_intents(&self, intents: &IntentMap) -> Result<SyncReport, BridgeError> {
        let token = self.oauth.require_token().await?;
        self.sync.replace_intents(intents, &token).await
    }

    pub async fn detect(&self, utterance: &str, session: Option<&str>) -> Result<Value, BridgeError> {
        let token = self.oauth.require_token().await?;
        self.relay.detect_intent(utterance, session, &token).await
    }
}
