use crate::api::{ApiError, ApiResult, BackendApi};
use crate::config::ApiConfig;
use crate::types::{
    ChartRequest, ChartResponse, HealthResponse, TimezoneRequest, TimezoneResponse,
    VersionResponse,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

pub const HEALTH_PATH: &str = "/api/health";
pub const VERSION_PATH: &str = "/api/version";
pub const TIMEZONE_PATH: &str = "/api/get-timezone";
pub const CHART_PATH: &str = "/api/calculate-chart";

/// `BackendApi` over plain HTTP/JSON.
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    config: ApiConfig,
}

impl HttpBackend {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        config
            .validate()
            .map_err(|message| ApiError::InvalidConfig { message })?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url,
            config,
        })
    }

    pub fn with_default_config() -> ApiResult<Self> {
        Self::new(ApiConfig::default())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Unavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ApiError::Unavailable {
                message: format!("Cannot connect to backend: {}", err),
            }
        } else {
            ApiError::Network(err)
        }
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> ApiResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(Self::map_send_error)?;

        if !status.is_success() {
            warn!("{} returned {}", path, status);
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        debug!("GET {}", path);

        let response = self
            .http_client
            .get(self.url(path))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::decode(path, response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", path);

        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::decode(path, response).await
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn health(&self) -> ApiResult<HealthResponse> {
        self.get_json(HEALTH_PATH).await
    }

    async fn version(&self) -> ApiResult<VersionResponse> {
        self.get_json(VERSION_PATH).await
    }

    async fn timezone(&self, request: &TimezoneRequest) -> ApiResult<TimezoneResponse> {
        self.post_json(TIMEZONE_PATH, request).await
    }

    async fn calculate_chart(&self, request: &ChartRequest) -> ApiResult<ChartResponse> {
        self.post_json(CHART_PATH, request).await
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
