use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

/// Failure modes shared by the OAuth controller, the intent sync engine and
/// the query relay.
#[derive(Debug)]
pub enum BridgeError {
    /// Network, DNS, TLS or timeout failure before a response arrived.
    Transport(String),
    /// The provider answered with a non-success status.
    Provider { status: u16, body: Option<Value> },
    /// The provider answered 2xx but the body did not have the expected shape.
    MalformedResponse(String),
    /// Token file or credentials document is missing or unreadable.
    StorageUnavailable { path: PathBuf, reason: String },
    /// The persisted token did not pass the liveness probe.
    ValidationFailure,
    InvalidInput(String),
}

impl BridgeError {
    pub fn storage(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the caller should be routed back through authorization.
    pub fn requires_authorization(&self) -> bool {
        match self {
            Self::StorageUnavailable { .. } | Self::ValidationFailure => true,
            Self::Provider { status, .. } => *status == 401,
            _ => false,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Provider { status, body } => {
                write!(f, "provider returned status {status}")?;
                match body {
                    Some(Value::String(text)) => write!(f, ": {text}"),
                    Some(body) => write!(f, ": {body}"),
                    None => Ok(()),
                }
            }
            Self::MalformedResponse(msg) => write!(f, "malformed provider response: {msg}"),
            Self::StorageUnavailable { path, reason } => {
                write!(f, "storage unavailable at {}: {reason}", path.display())
            }
            Self::ValidationFailure => write!(f, "access token failed validation"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Provider {
                status: status.as_u16(),
                body: None,
            };
        }
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        if err.is_timeout() {
            return Self::Transport(format!("request timed out: {err}"));
        }
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::BridgeError;

    #[test]
    fn provider_error_display_includes_body() {
        let err = BridgeError::Provider {
            status: 404,
            body: Some(json!({"error": {"message": "agent not found"}})),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("404"));
        assert!(rendered.contains("agent not found"));
    }

    #[test]
    fn authorization_is_required_for_storage_and_validation_failures() {
        assert!(BridgeError::storage("/tmp/currentToken.txt", "missing").requires_authorization());
        assert!(BridgeError::ValidationFailure.requires_authorization());
        assert!(
            BridgeError::Provider {
                status: 401,
                body: None
            }
            .requires_authorization()
        );
        assert!(!BridgeError::Transport("reset".to_string()).requires_authorization());
    }
}
