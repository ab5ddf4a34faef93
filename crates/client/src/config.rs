//! Environment-driven configuration for the HTTP client.

use std::env;
use std::time::Duration;

use crate::error::ClientError;

/// Environment variable holding the API base URL.
pub const ENV_API_URL: &str = "SKYMOUNT_API_URL";
/// Environment variable holding the bearer token.
pub const ENV_TOKEN: &str = "SKYMOUNT_TOKEN";

/// Overall deadline applied to every outbound request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection details for the platform API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the platform, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token attached to every request.
    pub token: String,
    /// Per-request overall deadline.
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            token: token.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Load endpoint and credentials from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url: String = env::var(ENV_API_URL)
            .map_err(|_| ClientError::Config(format!("{} is not set", ENV_API_URL)))?;
        let token: String = env::var(ENV_TOKEN)
            .map_err(|_| ClientError::Config(format!("{} is not set", ENV_TOKEN)))?;
        if base_url.is_empty() {
            return Err(ClientError::Config(format!("{} is empty", ENV_API_URL)));
        }
        Ok(Self::new(base_url, token))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let cfg = ApiConfig::new("https://api.example.com///", "tok");
        assert_eq!(cfg.base_url, "https://api.example.com");
    }

    #[test]
    fn test_timeout_builder() {
        let cfg = ApiConfig::new("https://api.example.com", "tok")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    }
}
