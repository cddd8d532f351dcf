//! Health-gated readiness.
//!
//! The backend counts as ready once its health endpoint reports `healthy`.
//! Until then every failed check, including connection errors, just means
//! "not yet".

use crate::process::BackendProcess;
use client::BackendApi;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Overall deadline
    pub timeout: Duration,
    /// Minimum spacing between checks
    pub interval: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy {
        elapsed: Duration,
        attempts: u32,
    },
    TimedOut {
        elapsed: Duration,
        attempts: u32,
        last_error: Option<String>,
    },
    /// The backend process died before becoming healthy
    Exited {
        elapsed: Duration,
        status: String,
    },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            HealthOutcome::Healthy { elapsed, .. }
            | HealthOutcome::TimedOut { elapsed, .. }
            | HealthOutcome::Exited { elapsed, .. } => *elapsed,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            HealthOutcome::Healthy { elapsed, attempts } => format!(
                "healthy after {:.1}s ({} check{})",
                elapsed.as_secs_f64(),
                attempts,
                if *attempts == 1 { "" } else { "s" }
            ),
            HealthOutcome::TimedOut {
                elapsed,
                attempts,
                last_error,
            } => {
                let mut detail = format!(
                    "not healthy after {:.1}s ({} checks)",
                    elapsed.as_secs_f64(),
                    attempts
                );
                if let Some(error) = last_error {
                    detail.push_str(&format!(", last: {}", error));
                }
                detail
            }
            HealthOutcome::Exited { status, .. } => {
                format!("backend exited before becoming healthy ({})", status)
            }
        }
    }
}

/// Poll `api.health()` until it reports healthy, the policy deadline passes,
/// or `process` exits.
///
/// The first check is sent immediately. Checks are at least
/// `policy.interval` apart, and none is sent once the deadline has passed.
pub async fn wait_until_healthy<A>(
    api: &A,
    policy: &HealthPolicy,
    mut process: Option<&mut BackendProcess>,
) -> HealthOutcome
where
    A: BackendApi + ?Sized,
{
    let start = Instant::now();
    // `None` when the timeout is too large to represent: wait without a deadline.
    let deadline = start.checked_add(policy.timeout);
    let mut attempts = 0;
    let mut last_error = None;

    info!(
        "Waiting up to {}s for {} to become healthy",
        policy.timeout.as_secs_f64(),
        api.base_url()
    );

    loop {
        if let Some(process) = process.as_deref_mut() {
            match process.try_exit_status() {
                Ok(Some(status)) => {
                    warn!("Backend exited with {} while waiting for health", status);
                    return HealthOutcome::Exited {
                        elapsed: start.elapsed(),
                        status: status.to_string(),
                    };
                }
                Ok(None) => {}
                Err(e) => debug!("Could not poll backend process: {}", e),
            }
        }

        let remaining = time_left(deadline);
        if remaining.is_zero() {
            break;
        }

        attempts += 1;
        match timeout(remaining, api.health()).await {
            Ok(Ok(health)) if health.is_healthy() => {
                let elapsed = start.elapsed();
                info!("Backend healthy after {}ms", elapsed.as_millis());
                return HealthOutcome::Healthy { elapsed, attempts };
            }
            Ok(Ok(health)) => {
                debug!("Health check {}: status {}", attempts, health.status);
                last_error = Some(format!("status {}", health.status));
            }
            Ok(Err(e)) => {
                debug!("Health check {}: {}", attempts, e);
                last_error = Some(e.to_string());
            }
            Err(_) => {
                debug!("Health check {} hit the deadline", attempts);
                last_error = Some("check timed out".to_string());
            }
        }

        let remaining = time_left(deadline);
        if remaining.is_zero() {
            break;
        }
        sleep(policy.interval.min(remaining)).await;
    }

    let elapsed = start.elapsed();
    warn!(
        "Backend not healthy after {}ms ({} checks)",
        elapsed.as_millis(),
        attempts
    );
    HealthOutcome::TimedOut {
        elapsed,
        attempts,
        last_error,
    }
}

fn time_left(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use client::{
        ApiError, ApiResult, ChartRequest, ChartResponse, HealthResponse, TimezoneRequest,
        TimezoneResponse, VersionResponse,
    };
    use std::sync::Mutex;

    /// Answers health checks from a script, repeating the last entry.
    struct ScriptedHealth {
        statuses: Vec<Option<&'static str>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedHealth {
        fn new(statuses: Vec<Option<&'static str>>) -> Self {
            Self {
                statuses,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BackendApi for ScriptedHealth {
        async fn health(&self) -> ApiResult<HealthResponse> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() - 1
            };
            let status = self.statuses[index.min(self.statuses.len() - 1)];
            match status {
                Some(status) => Ok(HealthResponse {
                    status: status.into(),
                }),
                None => Err(ApiError::Unavailable {
                    message: "connection refused".to_string(),
                }),
            }
        }

        async fn version(&self) -> ApiResult<VersionResponse> {
            unreachable!()
        }

        async fn timezone(&self, _request: &TimezoneRequest) -> ApiResult<TimezoneResponse> {
            unreachable!()
        }

        async fn calculate_chart(&self, _request: &ChartRequest) -> ApiResult<ChartResponse> {
            unreachable!()
        }

        fn base_url(&self) -> &str {
            "scripted"
        }
    }

    fn policy(timeout_ms: u64, interval_ms: u64) -> HealthPolicy {
        HealthPolicy {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test]
    async fn test_immediately_healthy() {
        let api = ScriptedHealth::new(vec![Some("healthy")]);
        let outcome = wait_until_healthy(&api, &HealthPolicy::default(), None).await;

        assert!(outcome.is_healthy());
        assert!(outcome.elapsed() < Duration::from_secs(1));
        assert_eq!(api.call_times().len(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_does_not_panic() {
        let api = ScriptedHealth::new(vec![None, Some("healthy")]);
        let huge = HealthPolicy {
            timeout: Duration::from_secs(u64::MAX),
            interval: Duration::from_millis(10),
        };
        let outcome = wait_until_healthy(&api, &huge, None).await;

        assert!(outcome.is_healthy());
        assert_eq!(api.call_times().len(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_retried_until_healthy() {
        let api = ScriptedHealth::new(vec![None, Some("starting"), Some("healthy")]);
        let outcome = wait_until_healthy(&api, &policy(2_000, 50), None).await;

        match outcome {
            HealthOutcome::Healthy { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected healthy, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_times_out_at_deadline() {
        let api = ScriptedHealth::new(vec![None]);
        let outcome = wait_until_healthy(&api, &policy(500, 100), None).await;

        assert!(!outcome.is_healthy());
        assert!(outcome.elapsed() >= Duration::from_millis(500));
        assert!(outcome.detail().contains("connection refused"));

        let calls = api.call_times();
        assert!(calls.len() <= 5, "too many checks: {}", calls.len());
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_unhealthy_status_is_not_ready() {
        let api = ScriptedHealth::new(vec![Some("degraded")]);
        let outcome = wait_until_healthy(&api, &policy(300, 100), None).await;

        match outcome {
            HealthOutcome::TimedOut { last_error, .. } => {
                assert_eq!(last_error.as_deref(), Some("status \"degraded\""));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_detail() {
        let healthy = HealthOutcome::Healthy {
            elapsed: Duration::from_millis(1500),
            attempts: 1,
        };
        assert_eq!(healthy.detail(), "healthy after 1.5s (1 check)");

        let exited = HealthOutcome::Exited {
            elapsed: Duration::from_millis(10),
            status: "exit status: 2".to_string(),
        };
        assert!(exited.detail().contains("exit status: 2"));
    }
}
