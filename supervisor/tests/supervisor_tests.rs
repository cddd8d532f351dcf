//! End-to-end runs of the supervision sequence against a fake HTTP backend.
//!
//! The "backend process" is a shell script that just sleeps; the HTTP side is
//! served by mockito on the port the supervisor is pointed at.

use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use supervisor::{
    Phase, Supervisor, SupervisorConfig, BACKEND_HEALTH, BACKEND_START, CHART_CALCULATION,
    ENDPOINT_ORDER,
};
use tempfile::TempDir;

fn port_of(server: &mockito::Server) -> u16 {
    server
        .host_with_port()
        .rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
        .expect("mockito port")
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Config that finds no executable and falls back to `app.py` run by `sh`.
fn script_backend_config(dir: &Path, port: u16) -> SupervisorConfig {
    std::fs::write(dir.join("app.py"), "exec sleep 30\n").unwrap();
    SupervisorConfig::default()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_search_roots(vec![dir.join("dist")], vec![dir.to_path_buf()])
        .with_interpreter("sh")
        .with_health_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(100))
        .with_stop_grace(Duration::from_secs(5))
}

async fn mock_backend(
    server: &mut mockito::Server,
    chart: serde_json::Value,
) -> Vec<mockito::Mock> {
    let mut mocks = Vec::new();
    for (method, path, body) in [
        ("GET", "/api/health", json!({"status": "healthy"})),
        ("GET", "/api/version", json!({"api_version": "1.4.0"})),
        ("POST", "/api/get-timezone", json!({"timezone": "Europe/London"})),
        ("POST", "/api/calculate-chart", chart),
    ] {
        mocks.push(
            server
                .mock(method, path)
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body.to_string())
                .create_async()
                .await,
        );
    }
    mocks
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_run_passes() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_backend(&mut server, json!({"judgment": "YES", "confidence": 81})).await;
    let dir = TempDir::new().unwrap();

    let mut supervisor =
        Supervisor::new(script_backend_config(dir.path(), port_of(&server))).unwrap();
    let started = Instant::now();
    let summary = supervisor.run().await;

    assert!(summary.success, "{}", supervisor.report().render());
    assert_eq!(summary.total, 2 + ENDPOINT_ORDER.len());
    assert_eq!(summary.passed, summary.total);
    assert_eq!(supervisor.phase(), Phase::Reported);
    assert!(supervisor.process().is_none(), "backend must be stopped");
    assert!(started.elapsed() < Duration::from_secs(5));

    let names: Vec<_> = supervisor
        .report()
        .results()
        .iter()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(names[0], BACKEND_START);
    assert_eq!(names[1], BACKEND_HEALTH);
    assert_eq!(&names[2..], &ENDPOINT_ORDER.map(String::from));
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_judgment_fails_single_result() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_backend(&mut server, json!({"confidence": 12})).await;
    let dir = TempDir::new().unwrap();

    let mut supervisor =
        Supervisor::new(script_backend_config(dir.path(), port_of(&server))).unwrap();
    let summary = supervisor.run().await;

    assert!(!summary.success);
    assert_eq!(summary.total, 6);
    assert_eq!(summary.passed, 5);
    let failed: Vec<_> = supervisor
        .report()
        .results()
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(failed, vec![CHART_CALCULATION]);
    assert_eq!(summary.exit_code(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unresponsive_backend_times_out_and_is_stopped() {
    let dir = TempDir::new().unwrap();
    let config = script_backend_config(dir.path(), closed_port())
        .with_health_timeout(Duration::from_secs(1))
        .with_poll_interval(Duration::from_millis(250));

    let mut supervisor = Supervisor::new(config).unwrap();
    let started = Instant::now();
    let summary = supervisor.run().await;

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(summary.total, 2);
    assert!(supervisor.report().get(BACKEND_START).unwrap().passed);
    let health = supervisor.report().get(BACKEND_HEALTH).unwrap();
    assert!(!health.passed);
    assert!(health.detail.contains("not healthy"), "{}", health.detail);
    assert!(supervisor.process().is_none());
    assert_eq!(
        supervisor.history(),
        &[
            Phase::Idle,
            Phase::Starting,
            Phase::WaitingHealthy,
            Phase::Stopping,
            Phase::Reported
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_backend_exit_ends_health_wait_early() {
    let dir = TempDir::new().unwrap();
    let config = script_backend_config(dir.path(), closed_port())
        .with_health_timeout(Duration::from_secs(10));
    std::fs::write(dir.path().join("app.py"), "exit 3\n").unwrap();

    let mut supervisor = Supervisor::new(config).unwrap();
    let started = Instant::now();
    let summary = supervisor.run().await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.total, 2);
    let health = supervisor.report().get(BACKEND_HEALTH).unwrap();
    assert!(!health.passed);
    assert!(health.detail.contains("exited"), "{}", health.detail);
}

#[tokio::test]
async fn test_no_backend_found_reports_unavailable() {
    let dir = TempDir::new().unwrap();
    let config = SupervisorConfig::default()
        .with_search_roots(vec![dir.path().join("a")], vec![dir.path().join("b")]);

    let mut supervisor = Supervisor::new(config).unwrap();
    let summary = supervisor.run().await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.passed, 0);
    let start = supervisor.report().get(BACKEND_START).unwrap();
    assert!(start.detail.contains("No backend available"));
    assert!(supervisor.report().get(BACKEND_HEALTH).is_none());
}
