use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Login or token refresh rejected by the backend.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-2xx response from any other endpoint.
    #[error("request failed ({status}): {message}")]
    Api { status: StatusCode, message: String },

    /// Refused locally because the signed-in user lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// Transport and status failures are the only ones that justify computing
    /// analytics locally; a body of the wrong shape is reported as is.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Api { .. })
    }
}

/// Picks the most specific human-readable message out of an error body.
///
/// Looks at `detail`, then `message`, then the first entry of each of
/// `field_keys` (DRF-style `{"email": ["already taken"]}`).
pub fn backend_message(body: &str, field_keys: &[&str]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    for key in ["detail", "message"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }

    field_keys.iter().find_map(|key| match value.get(*key)? {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Array(items) => items.first()?.as_str().map(str::to_string),
        _ => None,
    })
}
