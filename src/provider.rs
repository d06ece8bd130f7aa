use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BridgeError;

/// `webhookState` value that leaves fulfillment webhooks disabled.
pub const WEBHOOK_STATE_DISABLED: i32 = 0;

/// An intent as listed by the provider. Only the resource name matters for
/// deletion; the rest is carried for logging.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIntent {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntentListResponse {
    // The provider omits the field entirely when the agent has no intents.
    #[serde(default)]
    intents: Vec<RemoteIntent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIntent {
    pub display_name: String,
    pub webhook_state: i32,
    pub training_phrases: Vec<TrainingPhrase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhraseType {
    #[serde(rename = "TYPE_UNSPECIFIED")]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingPhrase {
    #[serde(rename = "type")]
    pub phrase_type: PhraseType,
    pub parts: Vec<PhrasePart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhrasePart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectIntentRequest {
    pub query_input: QueryInput,
    pub query_params: QueryParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryInput {
    pub text: TextInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub text: String,
    pub language_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub time_zone: String,
}

pub fn build_http_client(timeout: Duration) -> Client {
    match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "failed to build configured HTTP client; falling back to default reqwest client");
            Client::new()
        }
    }
}

/// Bearer-authenticated calls against one project's agent.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: Client,
    api_base: String,
    project_id: String,
}

impl AgentClient {
    pub fn new(http: Client, api_base: &str, project_id: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        }
    }

    fn agent_url(&self) -> String {
        format!("{}/projects/{}/agent", self.api_base, self.project_id)
    }

    pub async fn get_agent(&self, token: &str) -> Result<Value, BridgeError> {
        let response = self
            .http
            .get(self.agent_url())
            .bearer_auth(token)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn list_intents(&self, token: &str) -> Result<Vec<RemoteIntent>, BridgeError> {
        let response = self
            .http
            .get(format!("{}/intents", self.agent_url()))
            .bearer_auth(token)
            .send()
            .await?;
        let listed: IntentListResponse = read_json(response).await?;
        Ok(listed.intents)
    }

    /// `name` is the full resource path the provider assigned, e.g.
    /// `projects/p/agent/intents/<uuid>`.
    pub async fn delete_intent(&self, token: &str, name: &str) -> Result<(), BridgeError> {
        let name = name.trim_start_matches('/');
        let response = self
            .http
            .delete(format!("{}/{name}", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(provider_failure(response).await);
        }
        debug!(intent = %name, status = %status, "intent deleted");
        Ok(())
    }

    pub async fn create_intent(&self, token: &str, intent: &NewIntent) -> Result<Value, BridgeError> {
        let response = self
            .http
            .post(format!("{}/intents", self.agent_url()))
            .bearer_auth(token)
            .json(intent)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn detect_intent(
        &self,
        token: &str,
        session_id: &str,
        request: &DetectIntentRequest,
    ) -> Result<Value, BridgeError> {
        let response = self
            .http
            .post(format!("{}/sessions/{session_id}:detectIntent", self.agent_url()))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BridgeError> {
    if !response.status().is_success() {
        return Err(provider_failure(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|err| BridgeError::MalformedResponse(err.to_string()))
}

/// Captures the provider's error body, keeping it as JSON when it parses.
pub(crate) async fn provider_failure(response: Response) -> BridgeError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(text) if !text.trim().is_empty() => {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        }
        Ok(_) => None,
        Err(err) => {
            warn!(status, error = %err, "failed to read provider error body");
            None
        }
    };
    BridgeError::Provider { status, body }
}
