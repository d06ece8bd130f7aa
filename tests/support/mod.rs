use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::{
    Form, Json, Router,
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

pub const LIVE_TOKEN: &str = "ya29.live";

/// Every provider call the fake received, e.g. `DELETE old` or `CREATE greet`.
pub type Calls = Arc<Mutex<Vec<String>>>;

pub struct FakeProvider {
    pub base: String,
    pub calls: Calls,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// OAuth token + tokeninfo endpoints and a one-project agent API.
pub async fn spawn_fake_provider() -> Result<FakeProvider> {
    let calls: Calls = Arc::default();
    let app = Router::new()
        .route(
            "/oauth2/v4/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                if form.get("code").map(String::as_str) == Some("good-code") {
                    Json(json!({"access_token": LIVE_TOKEN, "token_type": "Bearer"})).into_response()
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response()
                }
            }),
        )
        .route(
            "/oauth2/v1/tokeninfo",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                if query.get("access_token").map(String::as_str) == Some(LIVE_TOKEN) {
                    (StatusCode::OK, Json(json!({"scope": "cloud-platform"}))).into_response()
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_token"}))).into_response()
                }
            }),
        )
        .route(
            "/v2/projects/proj/agent",
            get(|| async { Json(json!({"parent": "projects/proj", "displayName": "myagent"})) }),
        )
        .route(
            "/v2/projects/proj/agent/intents",
            get(|State(calls): State<Calls>| async move {
                calls.lock().expect("calls").push("LIST".to_string());
                Json(json!({"intents": [
                    {"name": "projects/proj/agent/intents/old", "displayName": "stale"}
                ]}))
            })
            .post(|State(calls): State<Calls>, Json(body): Json<Value>| async move {
                let name = body["displayName"].as_str().unwrap_or_default().to_string();
                calls.lock().expect("calls").push(format!("CREATE {name}"));
                Json(json!({"name": "projects/proj/agent/intents/new", "displayName": name}))
            }),
        )
        .route(
            "/v2/projects/proj/agent/intents/{id}",
            delete(|State(calls): State<Calls>, UrlPath(id): UrlPath<String>| async move {
                calls.lock().expect("calls").push(format!("DELETE {id}"));
                Json(json!({}))
            }),
        )
        .route(
            "/v2/projects/proj/agent/sessions/{session}",
            post(|UrlPath(session): UrlPath<String>, Json(body): Json<Value>| async move {
                Json(json!({
                    "session": session,
                    "queryResult": {
                        "queryText": body["queryInput"]["text"]["text"],
                        "languageCode": body["queryInput"]["text"]["languageCode"],
                        "intent": {"displayName": "time"}
                    }
                }))
            }),
        )
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(FakeProvider {
        base: format!("http://{addr}"),
        calls,
        handle,
    })
}

/// A state directory plus client secret file, optionally seeded with a token.
pub struct Workspace {
    pub temp: tempfile::TempDir,
    pub state_dir: PathBuf,
    pub client_secret: PathBuf,
}

impl Workspace {
    pub fn new(token: Option<&str>) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let state_dir = temp.path().join("state");
        std::fs::create_dir_all(&state_dir)?;
        let client_secret = temp.path().join("client_secret.json");
        write_private(
            &client_secret,
            r#"{"web": {"client_id": "cid", "client_secret": "secret", "project_id": "proj",
                "redirect_uris": ["http://localhost:8008/oauth2callback"]}}"#,
        )?;
        if let Some(token) = token {
            write_private(&state_dir.join("currentToken.txt"), token)?;
        }
        Ok(Self {
            temp,
            state_dir,
            client_secret,
        })
    }

    pub fn stored_token(&self) -> Option<String> {
        std::fs::read_to_string(self.state_dir.join("currentToken.txt")).ok()
    }

    /// The binary, pointed at `provider` through the environment.
    pub fn command(&self, provider: &FakeProvider) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_agent-bridge"));
        cmd.env("AGENT_BRIDGE_STATE_DIR", &self.state_dir)
            .env("AGENT_BRIDGE_CLIENT_SECRET", &self.client_secret)
            .env("AGENT_BRIDGE_AUTH_URL", format!("{}/o/oauth2/v2/auth", provider.base))
            .env("AGENT_BRIDGE_TOKEN_URL", format!("{}/oauth2/v4/token", provider.base))
            .env("AGENT_BRIDGE_TOKENINFO_URL", format!("{}/oauth2/v1/tokeninfo", provider.base))
            .env("AGENT_BRIDGE_API_BASE", format!("{}/v2", provider.base))
            .env("AGENT_BRIDGE_HTTP_TIMEOUT_SECS", "5")
            .env("RUST_LOG", "info")
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Starts `serve --port 0` and returns the child plus its base URL once
/// `/health` answers.
pub async fn spawn_bridge(
    workspace: &Workspace,
    provider: &FakeProvider,
) -> Result<(tokio::process::Child, String)> {
    let port_file = workspace.temp.path().join("bridge-port");
    let child = workspace
        .command(provider)
        .arg("serve")
        .arg("--port")
        .arg("0")
        .arg("--port-file")
        .arg(&port_file)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    let port: u16 = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(contents) = tokio::fs::read_to_string(&port_file).await
                && let Ok(port) = contents.trim().parse::<u16>()
            {
                return port;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await?;
    let base = format!("http://127.0.0.1:{port}");

    let client = reqwest::Client::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(response) = client.get(format!("{base}/health")).send().await
                && response.status().is_success()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await?;

    Ok((child, base))
}

pub fn write_private(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
