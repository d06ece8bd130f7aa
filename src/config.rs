use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";
const DEFAULT_TOKEN_INFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
const DEFAULT_API_BASE: &str = "https://dialogflow.googleapis.com/v2";
const DEFAULT_SESSION_ID: &str = "b21dffb3-4161-44b4-b136-b3677be342f5";
const DEFAULT_LANGUAGE_CODE: &str = "en";
const DEFAULT_TIME_ZONE: &str = "America/New_York";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CLIENT_SECRET_PATH: &str = "client_secret.json";

const ENV_STATE_DIR: &str = "AGENT_BRIDGE_STATE_DIR";
const ENV_CLIENT_SECRET: &str = "AGENT_BRIDGE_CLIENT_SECRET";
const ENV_AUTH_URL: &str = "AGENT_BRIDGE_AUTH_URL";
const ENV_TOKEN_URL: &str = "AGENT_BRIDGE_TOKEN_URL";
const ENV_TOKEN_INFO_URL: &str = "AGENT_BRIDGE_TOKENINFO_URL";
const ENV_API_BASE: &str = "AGENT_BRIDGE_API_BASE";
const ENV_SESSION_ID: &str = "AGENT_BRIDGE_SESSION_ID";
const ENV_LANGUAGE: &str = "AGENT_BRIDGE_LANGUAGE";
const ENV_TIME_ZONE: &str = "AGENT_BRIDGE_TIME_ZONE";
const ENV_HTTP_TIMEOUT: &str = "AGENT_BRIDGE_HTTP_TIMEOUT_SECS";
const ENV_LIST_FAILURE: &str = "AGENT_BRIDGE_LIST_FAILURE";

/// What the sync engine does when the existing intents cannot be listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFailurePolicy {
    /// Stop before touching the remote agent.
    #[default]
    Abort,
    /// Skip deletion and still create the new intents.
    Continue,
}

impl ListFailurePolicy {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" | "legacy" => Ok(Self::Continue),
            other => bail!("invalid {ENV_LIST_FAILURE} value '{other}', expected abort|continue"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub token_info_url: String,
    /// Versioned API root, e.g. `https://dialogflow.googleapis.com/v2`.
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionDefaults {
    pub session_id: String,
    pub language_code: String,
    pub time_zone: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub client_secret_path: PathBuf,
    pub endpoints: Endpoints,
    pub detection: DetectionDefaults,
    pub http_timeout: Duration,
    pub list_failure: ListFailurePolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => bail!("{name} must be valid UTF-8"),
        })
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        let non_empty = |name: &str| -> Result<Option<String>> {
            Ok(lookup(name)?
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()))
        };
        let string_or = |name: &str, default: &str| -> Result<String> {
            Ok(non_empty(name)?.unwrap_or_else(|| default.to_string()))
        };

        let state_dir = match non_empty(ENV_STATE_DIR)? {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| anyhow!("unable to resolve config directory; set {ENV_STATE_DIR}"))?
                .join("agent-bridge"),
        };

        let http_timeout = match non_empty(ENV_HTTP_TIMEOUT)? {
            Some(raw) => {
                let secs = raw
                    .parse::<u64>()
                    .with_context(|| format!("invalid {ENV_HTTP_TIMEOUT} value '{raw}'"))?;
                if secs == 0 {
                    bail!("{ENV_HTTP_TIMEOUT} must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let list_failure = match non_empty(ENV_LIST_FAILURE)? {
            Some(raw) => ListFailurePolicy::parse(&raw)?,
            None => ListFailurePolicy::default(),
        };

        Ok(Self {
            state_dir,
            client_secret_path: PathBuf::from(string_or(
                ENV_CLIENT_SECRET,
                DEFAULT_CLIENT_SECRET_PATH,
            )?),
            endpoints: Endpoints {
                auth_url: string_or(ENV_AUTH_URL, DEFAULT_AUTH_URL)?,
                token_url: string_or(ENV_TOKEN_URL, DEFAULT_TOKEN_URL)?,
                token_info_url: string_or(ENV_TOKEN_INFO_URL, DEFAULT_TOKEN_INFO_URL)?,
                api_base: string_or(ENV_API_BASE, DEFAULT_API_BASE)?
                    .trim_end_matches('/')
                    .to_string(),
            },
            detection: DetectionDefaults {
                session_id: string_or(ENV_SESSION_ID, DEFAULT_SESSION_ID)?,
                language_code: string_or(ENV_LANGUAGE, DEFAULT_LANGUAGE_CODE)?,
                time_zone: string_or(ENV_TIME_ZONE, DEFAULT_TIME_ZONE)?,
            },
            http_timeout,
            list_failure,
        })
    }

    /// Settings pointing every remote endpoint at a single fake provider.
    #[cfg(test)]
    pub fn for_provider(provider_base: &str, state_dir: PathBuf, client_secret: PathBuf) -> Self {
        let base = provider_base.trim_end_matches('/');
        Self {
            state_dir,
            client_secret_path: client_secret,
            endpoints: Endpoints {
                auth_url: format!("{base}/o/oauth2/v2/auth"),
                token_url: format!("{base}/oauth2/v4/token"),
                token_info_url: format!("{base}/oauth2/v1/tokeninfo"),
                api_base: format!("{base}/v2"),
            },
            detection: DetectionDefaults {
                session_id: DEFAULT_SESSION_ID.to_string(),
                language_code: DEFAULT_LANGUAGE_CODE.to_string(),
                time_zone: DEFAULT_TIME_ZONE.to_string(),
            },
            http_timeout: Duration::from_secs(5),
            list_failure: ListFailurePolicy::Abort,
        }
    }
}
