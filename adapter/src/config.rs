use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("base_url must use http or https, got {0}")]
    UnsupportedScheme(String),

    #[error("api_version must not be empty")]
    EmptyApiVersion,

    #[error("timeout_secs must be greater than zero")]
    ZeroTimeout,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the service; the organization is the first path segment below it.
    pub base_url: Url,
    pub api_version: String,
    /// Upper bound for a single HTTP call, retries excluded.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First backoff delay; doubled on every retry.
    pub base_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: Url::parse("https://dev.azure.com").expect("valid default url"),
            api_version: "7.1".into(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }
        if self.api_version.trim().is_empty() {
            return Err(ValidationError::EmptyApiVersion);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self, retries: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(2_u64.saturating_pow(retries)))
    }
}
