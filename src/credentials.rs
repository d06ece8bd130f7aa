use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::Builder;

use crate::error::BridgeError;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const TOKEN_FILE_NAME: &str = "currentToken.txt";

/// OAuth client registration, read once from the `web` section of the
/// provider-issued client secret document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretDocument {
    web: WebClientSection,
}

#[derive(Debug, Deserialize)]
struct WebClientSection {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    project_id: String,
}

impl ClientCredentials {
    fn parse(raw: &str) -> Result<Self, String> {
        let doc: ClientSecretDocument =
            serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))?;
        let web = doc.web;
        let redirect_uri = web
            .redirect_uris
            .into_iter()
            .next()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| "web.redirect_uris must contain at least one entry".to_string())?;
        for (field, value) in [
            ("web.client_id", &web.client_id),
            ("web.client_secret", &web.client_secret),
            ("web.project_id", &web.project_id),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} cannot be empty"));
            }
        }

        Ok(Self {
            client_id: web.client_id,
            client_secret: web.client_secret,
            redirect_uri,
            project_id: web.project_id,
        })
    }
}

/// Durable home of the single bearer token plus the static client document.
///
/// Reads and writes are not coordinated across requests: two concurrent code
/// exchanges both persist, and the later rename wins.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    token_file: PathBuf,
    client_secret_file: PathBuf,
}

impl CredentialStore {
    pub fn new(state_dir: &Path, client_secret_file: PathBuf) -> Self {
        Self {
            token_file: state_dir.join(TOKEN_FILE_NAME),
            client_secret_file,
        }
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    pub fn load_token(&self) -> Result<String, BridgeError> {
        let raw = match fs::read_to_string(&self.token_file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BridgeError::storage(&self.token_file, "no token has been stored"));
            }
            Err(err) => return Err(BridgeError::storage(&self.token_file, err)),
        };
        let token = raw.trim();
        if token.is_empty() {
            return Err(BridgeError::storage(&self.token_file, "token file is empty"));
        }
        Ok(token.to_string())
    }

    /// Replaces the stored token via temp file + rename so readers never see
    /// a half-written value.
    pub fn save_token(&self, token: &str) -> Result<(), BridgeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(BridgeError::InvalidInput(
                "refusing to persist an empty access token".to_string(),
            ));
        }
        let parent = self
            .token_file
            .parent()
            .ok_or_else(|| BridgeError::storage(&self.token_file, "path has no parent"))?;
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|err| BridgeError::storage(parent, err))?;
            // Only a directory created here is narrowed; an existing one keeps its mode.
            #[cfg(unix)]
            {
                fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                    .map_err(|err| BridgeError::storage(parent, err))?;
            }
        }

        let mut temp = Builder::new()
            .prefix(".agent-bridge-tmp-")
            .tempfile_in(parent)
            .map_err(|err| BridgeError::storage(parent, err))?;
        #[cfg(unix)]
        {
            temp.as_file_mut()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|err| BridgeError::storage(temp.path(), err))?;
        }
        temp.as_file_mut()
            .write_all(token.as_bytes())
            .and_then(|()| temp.as_file_mut().sync_data())
            .map_err(|err| BridgeError::storage(&self.token_file, err))?;
        temp.persist(&self.token_file)
            .map_err(|err| BridgeError::storage(&self.token_file, err.error))?;
        Ok(())
    }

    pub fn load_client_credentials(&self) -> Result<ClientCredentials, BridgeError> {
        let raw = fs::read_to_string(&self.client_secret_file)
            .map_err(|err| BridgeError::storage(&self.client_secret_file, err))?;
        ClientCredentials::parse(&raw)
            .map_err(|reason| BridgeError::storage(&self.client_secret_file, reason))
    }

    pub async fn load_token_async(&self) -> Result<String, BridgeError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_token())
            .await
            .map_err(|err| BridgeError::storage(&self.token_file, format!("load task failed: {err}")))?
    }

    pub async fn save_token_async(&self, token: String) -> Result<(), BridgeError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_token(&token))
            .await
            .map_err(|err| BridgeError::storage(&self.token_file, format!("save task failed: {err}")))?
    }
}
