use anyhow::{bail, Result};
use std::fmt;
use std::time::Duration;

use crate::util::{env_duration_secs, is_local_endpoint_url, parse_bool_flag};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
const LOCAL_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const REMOTE_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Config {
    pub api_url: String,
    pub access_token: Option<String>,
    /// Longest silence tolerated between two chunks of an answer stream.
    pub stream_idle_timeout: Duration,
    /// Whole-request deadline for non-streaming calls (history, timestamps).
    pub request_timeout: Duration,
    pub clamp_suggestions: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var("ASKDOC_API_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let access_token = std::env::var("ASKDOC_ACCESS_TOKEN").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v.trim().to_string())
            }
        });

        Ok(Self::from_parts(api_url, access_token))
    }

    /// Builds a config for `api_url`, reading the tunables from the environment.
    pub fn from_parts(api_url: String, access_token: Option<String>) -> Self {
        let default_idle = if is_local_endpoint_url(&api_url) {
            LOCAL_STREAM_IDLE_TIMEOUT
        } else {
            REMOTE_STREAM_IDLE_TIMEOUT
        };
        let stream_idle_timeout =
            env_duration_secs("ASKDOC_STREAM_IDLE_TIMEOUT_SECS", default_idle, 5, 600);
        let request_timeout =
            env_duration_secs("ASKDOC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT, 2, 300);
        let clamp_suggestions = std::env::var("ASKDOC_CLAMP_SUGGESTIONS")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(true);

        Self {
            api_url,
            access_token,
            stream_idle_timeout,
            request_timeout,
            clamp_suggestions,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid ASKDOC_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        let local_endpoint = self.is_local_endpoint();
        if !local_endpoint && self.access_token.is_none() {
            bail!(
                "ASKDOC_ACCESS_TOKEN must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if !local_endpoint && !self.api_url.starts_with("https://") {
            bail!(
                "Refusing to send credentials over plain HTTP to '{}'",
                self.api_url
            );
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("stream_idle_timeout", &self.stream_idle_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("clamp_suggestions", &self.clamp_suggestions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_defaults_use_shorter_idle_timeout() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::remove_var("ASKDOC_STREAM_IDLE_TIMEOUT_SECS");
        let local = Config::from_parts(DEFAULT_API_URL.to_string(), None);
        let remote = Config::from_parts(
            "https://docs.example.com/api/v1".to_string(),
            Some("t".to_string()),
        );
        assert_eq!(local.stream_idle_timeout, LOCAL_STREAM_IDLE_TIMEOUT);
        assert_eq!(remote.stream_idle_timeout, REMOTE_STREAM_IDLE_TIMEOUT);
        assert!(local.clamp_suggestions);
    }

    #[test]
    fn test_debug_output_redacts_token() {
        let config = Config::from_parts(
            "https://docs.example.com/api/v1".to_string(),
            Some("secret-token".to_string()),
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
