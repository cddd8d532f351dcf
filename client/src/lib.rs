pub mod api;
pub mod config;
pub mod http;
pub mod types;

pub use api::{ApiError, ApiResult, BackendApi};
pub use config::{ApiConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT};
pub use http::{HttpBackend, CHART_PATH, HEALTH_PATH, TIMEZONE_PATH, VERSION_PATH};
pub use types::{
    field_text, ChartRequest, ChartResponse, HealthResponse, TimezoneRequest, TimezoneResponse,
    VersionResponse, HEALTHY_STATUS,
};

pub mod prelude {
    pub use crate::api::*;
    pub use crate::config::*;
    pub use crate::http::*;
    pub use crate::types::*;
}
