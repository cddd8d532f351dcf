use crate::types::{
    ChartRequest, ChartResponse, HealthResponse, TimezoneRequest, TimezoneResponse,
    VersionResponse,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Backend returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ApiError {
    /// True when the backend could not be reached at all, as opposed to
    /// answering with something unexpected.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ApiError::Unavailable { .. })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The backend's HTTP surface.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn health(&self) -> ApiResult<HealthResponse>;

    async fn version(&self) -> ApiResult<VersionResponse>;

    async fn timezone(&self, request: &TimezoneRequest) -> ApiResult<TimezoneResponse>;

    async fn calculate_chart(&self, request: &ChartRequest) -> ApiResult<ChartResponse>;

    fn base_url(&self) -> &str;
}
