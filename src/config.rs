use crate::errors::ClientError;
use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_SESSION_PATH: &str = "data/session.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend origin without a trailing slash.
    pub base_url: String,
    pub session_path: PathBuf,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Reads `SUBTRACK_API_URL`, `SUBTRACK_SESSION_PATH` and
    /// `SUBTRACK_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(
            &lookup("SUBTRACK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;

        let session_path = lookup("SUBTRACK_SESSION_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH));

        let timeout = match lookup("SUBTRACK_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    return Err(ClientError::Config(format!(
                        "SUBTRACK_TIMEOUT_SECS must be a positive integer, got '{raw}'"
                    )));
                }
            },
            None => None,
        };

        Ok(Self {
            base_url,
            session_path,
            timeout,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, ClientError> {
        self.base_url = normalize_base_url(url)?;
        Ok(self)
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    pub fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::Config(format!(
            "API URL must start with http:// or https://, got '{raw}'"
        )));
    }
    Ok(trimmed.to_string())
}
