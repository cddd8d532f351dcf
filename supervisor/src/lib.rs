pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod health;
pub mod lifecycle;
pub mod process;
pub mod report;

pub use config::{
    ConfigError, ConfigFile, ConfigResult, EndpointInputs, Overrides, SearchPaths,
    SupervisorConfig,
};
pub use discovery::{
    list_candidates, locate_executable, locate_first, locate_script, Candidate, CandidateKind,
    ScriptLocation,
};
pub use endpoints::{
    exercise_endpoints, CHART_CALCULATION, ENDPOINT_ORDER, HEALTH_ENDPOINT, TIMEZONE_LOOKUP,
    VERSION_ENDPOINT,
};
pub use health::{wait_until_healthy, HealthOutcome, HealthPolicy};
pub use lifecycle::{
    transition, Phase, StepOutcome, Supervisor, SupervisorError, SupervisorResult,
    BACKEND_HEALTH, BACKEND_START,
};
pub use process::{
    platform_terminator, start_with_fallback, BackendProcess, LaunchKind, LaunchSpec,
    ProcessError, ProcessResult, StopOutcome, Terminator, TreeKillTerminator,
};
#[cfg(unix)]
pub use process::SignalTerminator;
pub use report::{Report, Summary, TestResult};
