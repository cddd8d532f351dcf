//! Backend supervision sequence.
//!
//! ```text
//! Idle → Starting → WaitingHealthy → Probing → Stopping → Reported
//!            │             │                      ▲
//!            └─── failed ──┴──────────────────────┘
//! ```
//!
//! Every failure routes through `Stopping`, so the backend is always torn down
//! and a report is always produced.

use crate::config::{ConfigError, SupervisorConfig};
use crate::health::{wait_until_healthy, HealthPolicy};
use crate::endpoints::exercise_endpoints;
use crate::process::{
    platform_terminator, start_with_fallback, working_dir, BackendProcess, ProcessResult,
    StopOutcome, Terminator,
};
use crate::report::{Report, Summary};
use client::{ApiError, BackendApi, HttpBackend};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const BACKEND_START: &str = "Backend start";
pub const BACKEND_HEALTH: &str = "Backend health";

/// Errors that stop the supervisor before it can produce a report
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create backend client: {0}")]
    Client(#[from] ApiError),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Starting,
    WaitingHealthy,
    Probing,
    Stopping,
    Reported,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Reported)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Starting => write!(f, "starting"),
            Phase::WaitingHealthy => write!(f, "waiting-healthy"),
            Phase::Probing => write!(f, "probing"),
            Phase::Stopping => write!(f, "stopping"),
            Phase::Reported => write!(f, "reported"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

impl From<bool> for StepOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed
        }
    }
}

/// Next phase after `phase` finished with `outcome`.
pub fn transition(phase: Phase, outcome: StepOutcome) -> Phase {
    use Phase::*;

    match (phase, outcome) {
        (Idle, _) => Starting,
        (Starting, StepOutcome::Succeeded) => WaitingHealthy,
        (WaitingHealthy, StepOutcome::Succeeded) => Probing,
        (Starting | WaitingHealthy, StepOutcome::Failed) => Stopping,
        (Probing, _) => Stopping,
        (Stopping, _) | (Reported, _) => Reported,
    }
}

/// Runs one supervise-and-check sequence against a backend.
pub struct Supervisor<A: BackendApi> {
    config: SupervisorConfig,
    api: A,
    terminator: Box<dyn Terminator>,
    process: Option<BackendProcess>,
    phase: Phase,
    history: Vec<Phase>,
    report: Report,
}

impl Supervisor<HttpBackend> {
    /// Supervisor talking HTTP to the configured host and port.
    pub fn new(config: SupervisorConfig) -> SupervisorResult<Self> {
        config.validate()?;
        let api = HttpBackend::new(config.api_config())?;
        Ok(Self::with_api(config, api))
    }
}

impl<A: BackendApi> Supervisor<A> {
    pub fn with_api(config: SupervisorConfig, api: A) -> Self {
        Self {
            config,
            api,
            terminator: platform_terminator(),
            process: None,
            phase: Phase::Idle,
            history: vec![Phase::Idle],
            report: Report::new(),
        }
    }

    pub fn with_terminator(mut self, terminator: Box<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases visited so far, in order
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    pub fn process(&self) -> Option<&BackendProcess> {
        self.process.as_ref()
    }

    /// Drive the sequence to `Reported` and return the tally.
    pub async fn run(&mut self) -> Summary {
        info!(run_id = %self.report.run_id, "Supervising backend at {}", self.api.base_url());

        loop {
            let outcome = match self.phase {
                Phase::Idle => StepOutcome::Succeeded,
                Phase::Starting => self.start().into(),
                Phase::WaitingHealthy => self.wait_until_healthy().await.into(),
                Phase::Probing => {
                    self.exercise_endpoints().await;
                    StepOutcome::Succeeded
                }
                Phase::Stopping => {
                    self.stop().await;
                    StepOutcome::Succeeded
                }
                Phase::Reported => break,
            };
            self.transition_to(transition(self.phase, outcome));
        }

        let summary = self.report.finish();
        info!("Run finished: {}", summary);
        summary
    }

    /// Check a backend that is already running, without spawning or stopping
    /// anything.
    pub async fn check(&mut self) -> Summary {
        info!(run_id = %self.report.run_id, "Checking backend at {}", self.api.base_url());
        self.exercise_endpoints().await;
        let summary = self.report.finish();
        info!("Check finished: {}", summary);
        summary
    }

    fn transition_to(&mut self, next: Phase) {
        debug!("State transition: {} → {}", self.phase, next);
        self.phase = next;
        self.history.push(next);
    }

    /// Spawn the backend, recording the outcome. Returns whether a process is
    /// now running.
    pub fn start(&mut self) -> bool {
        match start_with_fallback(&self.config) {
            Ok(process) => {
                let mut detail = format!(
                    "{} (pid {})",
                    process.spec().describe(),
                    process
                        .pid()
                        .map(|pid| pid.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                );
                if let Some(dir) = working_dir(process.spec()) {
                    detail.push_str(&format!(" in {}", dir.display()));
                }
                if let Some(reason) = process.fallback_reason() {
                    detail.push_str(&format!("; script fallback after {}", reason));
                }
                self.report.pass(BACKEND_START, detail);
                self.process = Some(process);
                true
            }
            Err(e) => {
                warn!("{}", e);
                self.report.fail(BACKEND_START, e.to_string());
                false
            }
        }
    }

    /// Poll until healthy, recording the outcome.
    pub async fn wait_until_healthy(&mut self) -> bool {
        let policy = HealthPolicy {
            timeout: self.config.health_timeout,
            interval: self.config.poll_interval,
        };
        let outcome = wait_until_healthy(&self.api, &policy, self.process.as_mut()).await;
        self.report
            .record(BACKEND_HEALTH, outcome.is_healthy(), outcome.detail());
        outcome.is_healthy()
    }

    pub async fn exercise_endpoints(&mut self) {
        exercise_endpoints(&self.api, &self.config.inputs, &mut self.report).await;
    }

    /// Stop the backend if one is running. Safe to call any number of times.
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(mut process) = self.process.take() else {
            debug!("No backend process to stop");
            return StopOutcome::NotRunning;
        };

        let result = process
            .stop(self.terminator.as_ref(), self.config.stop_grace)
            .await;
        settle_stop(result)
    }
}

fn settle_stop(result: ProcessResult<StopOutcome>) -> StopOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Failed to stop backend: {}", e);
            StopOutcome::Failed(e.to_string())
        }
    }
}
