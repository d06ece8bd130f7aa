use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use super::pages;
use crate::auth::TokenPhase;
use crate::bridge::Bridge;
use crate::detect::new_session_id;
use crate::error::BridgeError;
use crate::intents::{IntentMap, SyncReport};
use crate::logging;

#[derive(Clone)]
struct AppState {
    bridge: Bridge,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    logs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MutationResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct AuthUrlResponse {
    authorization_url: String,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRequest {
    code: String,
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    intents: IntentMap,
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    utterance: String,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateModelQuery {
    intents: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UseModelQuery {
    utterance: Option<String>,
    session: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_url: Option<String>,
}

struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                provider: None,
                authorization_url: None,
            },
        }
    }

    /// Maps a core failure onto an HTTP status. Authorization problems carry
    /// the URL the browser should visit next.
    fn from_bridge(bridge: &Bridge, err: BridgeError) -> Self {
        let authorization_url = if err.requires_authorization() {
            bridge.get_authorization_url().ok()
        } else {
            None
        };
        let message = err.to_string();
        let (status, provider) = match err {
            BridgeError::StorageUnavailable { .. } | BridgeError::ValidationFailure => {
                (StatusCode::UNAUTHORIZED, None)
            }
            BridgeError::Provider { status: 401, body } => (StatusCode::UNAUTHORIZED, body),
            BridgeError::Provider { body, .. } => (StatusCode::BAD_GATEWAY, body),
            BridgeError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, None),
            BridgeError::Transport(_) => (StatusCode::GATEWAY_TIMEOUT, None),
            BridgeError::InvalidInput(_) => (StatusCode::BAD_REQUEST, None),
        };
        Self {
            status,
            body: ErrorResponse {
                error: message,
                provider,
                authorization_url,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/createIntent", get(create_intent))
        .route("/oauth2callback", get(oauth_callback))
        .route("/updateModel", get(update_model))
        .route("/useModel", get(use_model))
        .route("/default", get(default_page))
        .route("/health", get(health))
        .route("/logs", get(logs))
        .route("/api/auth/url", get(auth_url))
        .route("/api/auth/exchange", post(auth_exchange))
        .route("/api/auth/status", get(auth_status))
        .route("/api/intents/sync", post(sync_intents))
        .route("/api/detect", post(detect))
        .route("/api/sessions", post(new_session))
        .fallback(default_page)
        .layer(middleware::from_fn(track_request))
        .with_state(AppState { bridge })
}

/// Stamps `X-Response-Time` and logs one line per request. Only the path is
/// logged; query strings may carry authorization codes.
async fn track_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        response.headers_mut().insert("x-response-time", value);
    }
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = elapsed_ms as u64,
        "request handled"
    );
    response
}

async fn root() -> Redirect {
    Redirect::to("/createIntent")
}

async fn default_page() -> Html<String> {
    pages::default_page()
}

async fn create_intent(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.bridge.authorize().await {
        Ok(TokenPhase::Ready(_)) => Ok(pages::create_intent_page().into_response()),
        Ok(TokenPhase::AwaitingCode { .. }) => Ok(Redirect::to("/oauth2callback").into_response()),
        Err(err) => {
            error!(error = %err, "failed to resolve authorization state");
            Err(ApiError::from_bridge(&state.bridge, err))
        }
    }
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(error) = query.error.as_deref() {
        warn!(error, "provider returned an authorization error");
    }

    let Some(code) = query.code else {
        if let Some(error) = query.error {
            return Ok(pages::oauth_failed_page(&error).into_response());
        }
        let url = state
            .bridge
            .get_authorization_url()
            .map_err(|err| ApiError::from_bridge(&state.bridge, err))?;
        return Ok(Redirect::to(&url).into_response());
    };

    match state.bridge.exchange_code(&code).await {
        Ok(_) => Ok(Redirect::to("/createIntent").into_response()),
        Err(err) => {
            error!(error = %err, "authorization code exchange failed");
            Ok(Redirect::to("/default").into_response())
        }
    }
}

async fn update_model(
    State(state): State<AppState>,
    Query(query): Query<UpdateModelQuery>,
) -> Result<Response, ApiError> {
    if let Some(error) = query.error.as_deref() {
        warn!(error, "caller reported an error with the model data");
    }
    let raw = query
        .intents
        .ok_or_else(|| ApiError::bad_request("missing query parameter 'intents'"))?;
    let intents: IntentMap = serde_json::from_str(&raw)
        .map_err(|err| ApiError::bad_request(format!("invalid intents JSON: {err}")))?;

    match state.bridge.sync_intents(&intents).await {
        Ok(report) => {
            log_partial_failures(&report);
            Ok(Redirect::to("/default").into_response())
        }
        Err(err) if err.requires_authorization() => {
            warn!(error = %err, "sync requested without a usable token");
            Ok(Redirect::to("/oauth2callback").into_response())
        }
        Err(err) => {
            error!(error = %err, "intent sync failed");
            Err(ApiError::from_bridge(&state.bridge, err))
        }
    }
}

async fn use_model(
    State(state): State<AppState>,
    Query(query): Query<UseModelQuery>,
) -> Result<Response, ApiError> {
    if let Some(error) = query.error.as_deref() {
        warn!(error, "caller reported an error with the query");
    }
    let Some(utterance) = query.utterance else {
        return Ok(pages::use_model_page().into_response());
    };

    let result = state
        .bridge
        .detect(&utterance, query.session.as_deref())
        .await
        .map_err(|err| {
            error!(error = %err, "intent detection failed");
            ApiError::from_bridge(&state.bridge, err)
        })?;
    Ok(Json(result).into_response())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn logs(Query(query): Query<LogsQuery>) -> Result<Json<LogsResponse>, ApiError> {
    let buffer = logging::global_log_buffer().ok_or_else(|| ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: ErrorResponse {
            error: "log buffer not initialized".to_string(),
            provider: None,
            authorization_url: None,
        },
    })?;
    let limit = query.limit.unwrap_or(200).clamp(1, 1000);
    Ok(Json(LogsResponse {
        logs: buffer.recent(limit),
    }))
}

async fn auth_url(State(state): State<AppState>) -> Result<Json<AuthUrlResponse>, ApiError> {
    let authorization_url = state
        .bridge
        .get_authorization_url()
        .map_err(|err| ApiError::from_bridge(&state.bridge, err))?;
    Ok(Json(AuthUrlResponse { authorization_url }))
}

async fn auth_exchange(
    State(state): State<AppState>,
    Json(request): Json<ExchangeRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    state
        .bridge
        .exchange_code(&request.code)
        .await
        .map_err(|err| {
            error!(error = %err, "authorization code exchange failed");
            ApiError::from_bridge(&state.bridge, err)
        })?;
    Ok(Json(MutationResponse { status: "ok" }))
}

async fn auth_status(State(state): State<AppState>) -> Json<crate::auth::TokenStatus> {
    Json(state.bridge.token_status().await)
}

async fn sync_intents(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    let report = state
        .bridge
        .sync_intents(&request.intents)
        .await
        .map_err(|err| {
            error!(error = %err, "intent sync failed");
            ApiError::from_bridge(&state.bridge, err)
        })?;
    log_partial_failures(&report);
    Ok(Json(report))
}

async fn detect(
    State(state): State<AppState>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .bridge
        .detect(&request.utterance, request.session.as_deref())
        .await
        .map_err(|err| {
            error!(error = %err, "intent detection failed");
            ApiError::from_bridge(&state.bridge, err)
        })?;
    Ok(Json(result))
}

async fn new_session() -> Json<SessionResponse> {
    Json(SessionResponse {
        session_id: new_session_id(),
    })
}

fn log_partial_failures(report: &SyncReport) {
    let failures = report.failure_count();
    if failures > 0 {
        warn!(
            failures,
            listed = ?report.listed,
            "intent sync completed with per-item failures"
        );
    }
}
