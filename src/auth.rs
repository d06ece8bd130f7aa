use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CLOUD_PLATFORM_SCOPE, Endpoints};
use crate::credentials::{ClientCredentials, CredentialStore};
use crate::error::BridgeError;
use crate::provider::read_json;

/// Where the caller stands in the authorization-code flow.
///
/// `AwaitingCode` covers both "no token stored" and "stored token failed
/// the probe"; there is no refresh path, so either way the browser has to
/// go back through the authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPhase {
    Ready(String),
    AwaitingCode { authorization_url: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub has_token: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct OAuthController {
    store: CredentialStore,
    credentials: Arc<ClientCredentials>,
    endpoints: Endpoints,
    http: Client,
}

impl OAuthController {
    pub fn new(
        store: CredentialStore,
        credentials: Arc<ClientCredentials>,
        endpoints: Endpoints,
        http: Client,
    ) -> Self {
        Self {
            store,
            credentials,
            endpoints,
            http,
        }
    }

    pub fn authorization_url(&self) -> Result<String, BridgeError> {
        let mut url = Url::parse(&self.endpoints.auth_url).map_err(|err| {
            BridgeError::InvalidInput(format!(
                "invalid authorization endpoint '{}': {err}",
                self.endpoints.auth_url
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("scope", CLOUD_PLATFORM_SCOPE)
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", &self.credentials.redirect_uri)
            .append_pair("response_type", "code");
        Ok(url.to_string())
    }

    /// Trades an authorization code for an access token and persists it.
    /// Nothing is written unless the provider returned a token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, BridgeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(BridgeError::InvalidInput(
                "authorization code is required".to_string(),
            ));
        }

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await?;
        let exchanged: TokenExchangeResponse = read_json(response).await?;

        self.store
            .save_token_async(exchanged.access_token.clone())
            .await?;
        info!(
            token_file = %self.store.token_file().display(),
            "access token obtained and persisted"
        );
        Ok(exchanged.access_token)
    }

    /// Liveness probe against the token-info endpoint. Any completed 2xx
    /// response counts as valid; the body is not inspected.
    pub async fn validate_token(&self, token: Option<&str>) -> bool {
        let Some(token) = token.filter(|value| !value.trim().is_empty()) else {
            return false;
        };

        match self
            .http
            .get(&self.endpoints.token_info_url)
            .query(&[("access_token", token)])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "access token probe rejected");
                false
            }
            Err(err) => {
                debug!(error = %redacted(err), "access token probe failed");
                false
            }
        }
    }

    pub async fn load_persisted_token(&self) -> Result<String, BridgeError> {
        self.store.load_token_async().await
    }

    /// Runs `NoToken -> probe -> (Ready | AwaitingCode)` for the stored token.
    pub async fn authorize(&self) -> Result<TokenPhase, BridgeError> {
        let token = match self.load_persisted_token().await {
            Ok(token) => Some(token),
            Err(err @ BridgeError::StorageUnavailable { .. }) => {
                info!(reason = %err, "no usable persisted token; authorization required");
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(token) = token {
            if self.validate_token(Some(&token)).await {
                return Ok(TokenPhase::Ready(token));
            }
            warn!("persisted access token is no longer valid; authorization required");
        }

        Ok(TokenPhase::AwaitingCode {
            authorization_url: self.authorization_url()?,
        })
    }

    /// Token for an operation that cannot proceed without one. A missing
    /// token surfaces as `StorageUnavailable`, a stale one as
    /// `ValidationFailure`.
    pub async fn require_token(&self) -> Result<String, BridgeError> {
        let token = self.load_persisted_token().await?;
        if self.validate_token(Some(&token)).await {
            Ok(token)
        } else {
            Err(BridgeError::ValidationFailure)
        }
    }

    pub async fn status(&self) -> TokenStatus {
        let token = self.load_persisted_token().await.ok();
        let has_token = token.is_some();
        let valid = self.validate_token(token.as_deref()).await;
        let authorization_url = if valid {
            None
        } else {
            self.authorization_url().ok()
        };
        TokenStatus {
            has_token,
            valid,
            authorization_url,
        }
    }
}

/// The probe URL carries the token in its query string.
fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}
