//! Endpoint checks.
//!
//! Each endpoint is called exactly once. A check passes when the response
//! decodes with its expected field present; any failure is recorded against
//! that check alone.

use crate::config::EndpointInputs;
use crate::report::Report;
use client::{field_text, ApiResult, BackendApi, ChartRequest, TimezoneRequest};
use tracing::{info, warn};

pub const HEALTH_ENDPOINT: &str = "Health endpoint";
pub const VERSION_ENDPOINT: &str = "Version endpoint";
pub const TIMEZONE_LOOKUP: &str = "Timezone lookup";
pub const CHART_CALCULATION: &str = "Chart calculation";

/// Check names in the order they run
pub const ENDPOINT_ORDER: [&str; 4] = [
    HEALTH_ENDPOINT,
    VERSION_ENDPOINT,
    TIMEZONE_LOOKUP,
    CHART_CALCULATION,
];

fn record<T>(
    report: &mut Report,
    name: &str,
    result: ApiResult<T>,
    describe: impl FnOnce(T) -> String,
) {
    match result {
        Ok(value) => {
            let detail = describe(value);
            info!("{} passed: {}", name, detail);
            report.pass(name, detail);
        }
        Err(e) => {
            warn!("{} failed: {}", name, e);
            report.fail(name, e.to_string());
        }
    }
}

pub async fn exercise_endpoints<A>(api: &A, inputs: &EndpointInputs, report: &mut Report)
where
    A: BackendApi + ?Sized,
{
    record(report, HEALTH_ENDPOINT, api.health().await, |health| {
        format!("status: {}", field_text(&health.status))
    });

    record(report, VERSION_ENDPOINT, api.version().await, |version| {
        format!("api_version: {}", field_text(&version.api_version))
    });

    let timezone_request = TimezoneRequest::new(inputs.timezone_location.as_str());
    record(
        report,
        TIMEZONE_LOOKUP,
        api.timezone(&timezone_request).await,
        |response| {
            format!(
                "{} -> {}",
                timezone_request.location,
                field_text(&response.timezone)
            )
        },
    );

    let chart_request = ChartRequest::new(
        inputs.chart_question.as_str(),
        inputs.chart_location.as_str(),
    )
    .with_current_time(inputs.use_current_time);
    record(
        report,
        CHART_CALCULATION,
        api.calculate_chart(&chart_request).await,
        |chart| match &chart.confidence {
            Some(confidence) => format!(
                "judgment: {} (confidence {})",
                field_text(&chart.judgment),
                field_text(confidence)
            ),
            None => format!("judgment: {}", field_text(&chart.judgment)),
        },
    );
}
