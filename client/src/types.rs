use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HEALTHY_STATUS: &str = "healthy";

// Response fields are held as raw JSON values: a field must be present, but
// its type is up to the backend. A missing field still fails decoding.

/// Renders a response field for a report line, without quotes around strings.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: Value,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status.as_str() == Some(HEALTHY_STATUS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionResponse {
    pub api_version: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimezoneRequest {
    pub location: String,
}

impl TimezoneRequest {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimezoneResponse {
    pub timezone: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub question: String,
    pub location: String,
    pub use_current_time: bool,
}

impl ChartRequest {
    pub fn new(question: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            location: location.into(),
            use_current_time: true,
        }
    }

    pub fn with_current_time(mut self, use_current_time: bool) -> Self {
        self.use_current_time = use_current_time;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartResponse {
    pub judgment: Value,
    #[serde(default)]
    pub confidence: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chart_request_uses_camel_case() {
        let request = ChartRequest::new("Will I get the job?", "London, UK");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "question": "Will I get the job?",
                "location": "London, UK",
                "useCurrentTime": true,
            })
        );
    }

    #[test]
    fn test_health_status() {
        let healthy: HealthResponse = serde_json::from_value(json!({"status": "healthy"})).unwrap();
        assert!(healthy.is_healthy());

        let starting: HealthResponse =
            serde_json::from_value(json!({"status": "starting"})).unwrap();
        assert!(!starting.is_healthy());
    }

    #[test]
    fn test_chart_response_requires_judgment() {
        let missing = serde_json::from_value::<ChartResponse>(json!({"confidence": 0.4}));
        assert!(missing.unwrap_err().to_string().contains("judgment"));

        let without_confidence: ChartResponse =
            serde_json::from_value(json!({"judgment": "YES"})).unwrap();
        assert_eq!(without_confidence.confidence, None);
    }

    #[test]
    fn test_present_fields_of_any_type_decode() {
        let version: VersionResponse = serde_json::from_value(json!({"api_version": 2})).unwrap();
        assert_eq!(field_text(&version.api_version), "2");

        let chart: ChartResponse =
            serde_json::from_value(json!({"judgment": "YES", "confidence": "high"})).unwrap();
        assert_eq!(field_text(&chart.judgment), "YES");
        assert_eq!(chart.confidence, Some(json!("high")));

        let missing = serde_json::from_str::<VersionResponse>("{}");
        assert!(missing.unwrap_err().to_string().contains("api_version"));
    }

    #[test]
    fn test_non_string_status_is_not_healthy() {
        let health: HealthResponse = serde_json::from_value(json!({"status": true})).unwrap();
        assert!(!health.is_healthy());
    }
}
