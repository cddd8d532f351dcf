use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;
/// Per-request timeout; chart calculation can take a while on a cold backend.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_host_port(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl ApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(format!("Base URL is not a valid URL: {}", self.base_url));
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
