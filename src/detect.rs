use rand::{Rng, distributions::Alphanumeric};
use serde_json::Value;
use tracing::debug;

use crate::config::DetectionDefaults;
use crate::error::BridgeError;
use crate::provider::{AgentClient, DetectIntentRequest, QueryInput, QueryParams, TextInput};

const SESSION_ID_LEN: usize = 32;
const MAX_SESSION_ID_LEN: usize = 36;

/// Forwards single utterances to the agent's detection endpoint.
///
/// Callers that pass no session share the configured default session and
/// therefore one conversation context on the provider side.
#[derive(Debug, Clone)]
pub struct QueryRelay {
    client: AgentClient,
    defaults: DetectionDefaults,
}

impl QueryRelay {
    pub fn new(client: AgentClient, defaults: DetectionDefaults) -> Self {
        Self { client, defaults }
    }

    pub fn build_request(&self, utterance: &str) -> DetectIntentRequest {
        DetectIntentRequest {
            query_input: QueryInput {
                text: TextInput {
                    text: utterance.to_string(),
                    language_code: self.defaults.language_code.clone(),
                },
            },
            query_params: QueryParams {
                time_zone: self.defaults.time_zone.clone(),
            },
        }
    }

    /// Returns the provider's response body untouched.
    pub async fn detect_intent(
        &self,
        utterance: &str,
        session: Option<&str>,
        token: &str,
    ) -> Result<Value, BridgeError> {
        if utterance.trim().is_empty() {
            return Err(BridgeError::InvalidInput("utterance cannot be empty".to_string()));
        }
        let session_id = match session {
            Some(session) => validate_session_id(session)?,
            None => self.defaults.session_id.as_str(),
        };

        debug!(session = session_id, "forwarding utterance for detection");
        self.client
            .detect_intent(token, session_id, &self.build_request(utterance))
            .await
    }
}

pub fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

fn validate_session_id(session: &str) -> Result<&str, BridgeError> {
    let session = session.trim();
    if session.is_empty() || session.len() > MAX_SESSION_ID_LEN {
        return Err(BridgeError::InvalidInput(format!(
            "session id must be 1..={MAX_SESSION_ID_LEN} characters"
        )));
    }
    if !session
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BridgeError::InvalidInput(
            "session id may only contain ASCII letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        routing::post,
    };
    use serde_json::{Value, json};

    use super::{QueryRelay, new_session_id, validate_session_id};
    use crate::config::DetectionDefaults;
    use crate::error::BridgeError;
    use crate::provider::{AgentClient, build_http_client};

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    fn defaults() -> DetectionDefaults {
        DetectionDefaults {
            session_id: "b21dffb3-4161-44b4-b136-b3677be342f5".to_string(),
            language_code: "en".to_string(),
            time_zone: "America/New_York".to_string(),
        }
    }

    async fn spawn_detector(seen: Seen) -> (QueryRelay, tokio::task::JoinHandle<()>) {
        let app = Router::new()
            .route(
                "/v2/projects/proj/agent/sessions/{session}",
                post(
                    |State(seen): State<Seen>,
                     Path(session): Path<String>,
                     Json(body): Json<Value>| async move {
                        seen.lock().expect("seen").push((session, body));
                        Json(json!({
                            "responseId": "r-1",
                            "queryResult": {
                                "queryText": "what time is it",
                                "intent": { "displayName": "time" },
                                "intentDetectionConfidence": 0.87,
                                "parameters": { "nested": { "deep": [1, 2] } }
                            }
                        }))
                    },
                ),
            )
            .with_state(seen);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind detect listener");
        let addr = listener.local_addr().expect("detect listener addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let client = AgentClient::new(
            build_http_client(std::time::Duration::from_secs(5)),
            &format!("http://{addr}/v2"),
            "proj",
        );
        (QueryRelay::new(client, defaults()), handle)
    }

    #[test]
    fn request_body_matches_provider_shape() {
        let relay = QueryRelay::new(
            AgentClient::new(reqwest::Client::new(), "http://127.0.0.1:9/v2", "proj"),
            defaults(),
        );
        assert_eq!(
            serde_json::to_value(relay.build_request("what time is it")).expect("serializes"),
            json!({
                "queryInput": { "text": { "text": "what time is it", "languageCode": "en" } },
                "queryParams": { "timeZone": "America/New_York" }
            })
        );
    }

    #[tokio::test]
    async fn returns_provider_json_unmodified() {
        let seen: Seen = Arc::default();
        let (relay, handle) = spawn_detector(seen.clone()).await;

        let result = relay
            .detect_intent("what time is it", None, "ya29.token")
            .await
            .expect("detection should succeed");
        assert_eq!(result["queryResult"]["intent"]["displayName"], "time");
        assert_eq!(
            result["queryResult"]["parameters"]["nested"]["deep"],
            json!([1, 2])
        );

        let seen = seen.lock().expect("seen").clone();
        assert_eq!(
            seen[0].0,
            "b21dffb3-4161-44b4-b136-b3677be342f5:detectIntent"
        );
        assert_eq!(seen[0].1["queryInput"]["text"]["text"], "what time is it");

        handle.abort();
    }

    #[tokio::test]
    async fn caller_session_isolates_conversations() {
        let seen: Seen = Arc::default();
        let (relay, handle) = spawn_detector(seen.clone()).await;

        relay
            .detect_intent("hello", Some("kiosk_7"), "ya29.token")
            .await
            .expect("detection should succeed");
        assert_eq!(seen.lock().expect("seen")[0].0, "kiosk_7:detectIntent");

        let err = relay
            .detect_intent("hello", Some("../agent"), "ya29.token")
            .await
            .expect_err("path characters are rejected");
        assert!(matches!(err, BridgeError::InvalidInput(_)));

        let err = relay
            .detect_intent("   ", None, "ya29.token")
            .await
            .expect_err("blank utterance is rejected");
        assert!(matches!(err, BridgeError::InvalidInput(_)));
        assert_eq!(seen.lock().expect("seen").len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn provider_rejection_keeps_its_error_body() {
        let app = Router::new().route(
            "/v2/projects/proj/agent/sessions/{session}",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": {
                        "code": 400,
                        "message": "Resource name does not match format",
                        "status": "INVALID_ARGUMENT"
                    }})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind detect listener");
        let addr = listener.local_addr().expect("detect listener addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let relay = QueryRelay::new(
            AgentClient::new(
                build_http_client(std::time::Duration::from_secs(5)),
                &format!("http://{addr}/v2"),
                "proj",
            ),
            defaults(),
        );

        match relay.detect_intent("hello", None, "ya29.token").await {
            Err(BridgeError::Provider {
                status: 400,
                body: Some(body),
            }) => {
                assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
            }
            other => panic!("expected provider error with body, got {other:?}"),
        }

        handle.abort();
    }

    #[test]
    fn generated_session_ids_are_valid_and_distinct() {
        let first = new_session_id();
        let second = new_session_id();
        assert_eq!(first.len(), 32);
        assert!(validate_session_id(&first).is_ok());
        assert_ne!(first, second);
    }
}
