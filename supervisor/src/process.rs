use crate::config::{SupervisorConfig, UNBUFFERED_ENV};
use crate::discovery::{locate_executable, locate_script, ScriptLocation};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Process control errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Neither the executable nor the script fallback could be started
    #[error("No backend available (executable: {executable}; script: {script})")]
    Unavailable { executable: String, script: String },

    /// The OS refused to create the process
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    /// The termination request itself failed
    #[error("Failed to terminate process {pid}: {reason}")]
    TerminateFailed { pid: u32, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProcessResult<T> = Result<T, ProcessError>;

/// How the backend was launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchKind {
    Executable,
    Script,
}

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchSpec {
    /// Native binary, run from its own directory
    Executable { path: PathBuf },
    /// Interpreter invocation of a script entry point
    Script {
        interpreter: String,
        location: ScriptLocation,
    },
}

impl LaunchSpec {
    pub fn kind(&self) -> LaunchKind {
        match self {
            LaunchSpec::Executable { .. } => LaunchKind::Executable,
            LaunchSpec::Script { .. } => LaunchKind::Script,
        }
    }

    /// Human-readable command line
    pub fn describe(&self) -> String {
        match self {
            LaunchSpec::Executable { path } => path.display().to_string(),
            LaunchSpec::Script {
                interpreter,
                location,
            } => format!("{} {}", interpreter, location.path.display()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = match self {
            LaunchSpec::Executable { path } => {
                let mut cmd = Command::new(path);
                if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                    cmd.current_dir(dir);
                }
                cmd
            }
            LaunchSpec::Script {
                interpreter,
                location,
            } => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&location.path).current_dir(&location.dir);
                cmd
            }
        };
        cmd.env(UNBUFFERED_ENV.0, UNBUFFERED_ENV.1)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Handle for a spawned backend.
///
/// The child is killed if the handle is dropped while it is still running.
#[derive(Debug)]
pub struct BackendProcess {
    child: Option<Child>,
    pid: Option<u32>,
    spec: LaunchSpec,
    fallback_reason: Option<String>,
}

/// How a stop request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to stop
    NotRunning,
    /// The process had already exited on its own
    AlreadyExited(ExitStatus),
    /// The process exited after the termination request
    Terminated(ExitStatus),
    /// The process ignored the termination request and was killed
    Killed,
    /// Stopping failed; the child is still killed when its handle drops
    Failed(String),
}

impl BackendProcess {
    /// Spawn `spec`, forwarding its output to the log when `forward_output`
    /// is set. Must be called from within a tokio runtime.
    pub fn spawn(spec: LaunchSpec, forward_output: bool) -> ProcessResult<Self> {
        let mut cmd = spec.command();
        if forward_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: spec.describe(),
            reason: e.to_string(),
        })?;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, "stderr");
        }

        let pid = child.id();
        info!("Spawned backend: {} (pid {:?})", spec.describe(), pid);

        Ok(Self {
            child: Some(child),
            pid,
            spec,
            fallback_reason: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kind(&self) -> LaunchKind {
        self.spec.kind()
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Why the executable was skipped, when this is the script fallback
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Whether a child is still held (it may have exited without being reaped)
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Exit status if the process has exited, without blocking
    pub fn try_exit_status(&mut self) -> ProcessResult<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    /// Ask the process to exit, then kill it if it is still running after
    /// `grace`. Calling this again, or on a process that was never started,
    /// returns [`StopOutcome::NotRunning`].
    pub async fn stop(
        &mut self,
        terminator: &dyn Terminator,
        grace: Duration,
    ) -> ProcessResult<StopOutcome> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(StopOutcome::NotRunning),
        };

        if let Some(status) = child.try_wait()? {
            debug!("Backend already exited with {}", status);
            return Ok(StopOutcome::AlreadyExited(status));
        }

        if let Some(pid) = child.id() {
            match terminator.terminate(pid).await {
                Ok(()) => match timeout(grace, child.wait()).await {
                    Ok(status) => {
                        let status = status?;
                        info!("Backend (pid {}) exited with {}", pid, status);
                        return Ok(StopOutcome::Terminated(status));
                    }
                    Err(_) => warn!(
                        "Backend (pid {}) still running {}ms after {}, killing",
                        pid,
                        grace.as_millis(),
                        terminator.name()
                    ),
                },
                Err(e) => warn!("{}", e),
            }
        }

        child.kill().await?;
        info!("Backend killed");
        Ok(StopOutcome::Killed)
    }
}

fn forward_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "backend", stream, "{}", line);
        }
    });
}

/// Platform-specific way of asking a process to exit.
#[async_trait]
pub trait Terminator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn terminate(&self, pid: u32) -> ProcessResult<()>;
}

/// Sends SIGTERM.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

#[cfg(unix)]
#[async_trait]
impl Terminator for SignalTerminator {
    fn name(&self) -> &'static str {
        "SIGTERM"
    }

    async fn terminate(&self, pid: u32) -> ProcessResult<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // 0 and negative values address process groups, never a single child.
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or_else(|| ProcessError::TerminateFailed {
                pid,
                reason: "pid out of range".to_string(),
            })?;

        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| ProcessError::TerminateFailed {
            pid,
            reason: e.to_string(),
        })
    }
}

/// Forcefully kills the process and all of its descendants.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeKillTerminator;

#[async_trait]
impl Terminator for TreeKillTerminator {
    fn name(&self) -> &'static str {
        "tree kill"
    }

    async fn terminate(&self, pid: u32) -> ProcessResult<()> {
        let pid_arg = pid.to_string();
        let output = Command::new("taskkill")
            .args(["/pid", pid_arg.as_str(), "/T", "/F"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessError::TerminateFailed {
                pid,
                reason: format!("taskkill: {}", e),
            })?;

        if !output.status.success() {
            return Err(ProcessError::TerminateFailed {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Terminator for the platform this binary was built for
#[cfg(unix)]
pub fn platform_terminator() -> Box<dyn Terminator> {
    Box::new(SignalTerminator)
}

/// Terminator for the platform this binary was built for
#[cfg(not(unix))]
pub fn platform_terminator() -> Box<dyn Terminator> {
    Box::new(TreeKillTerminator)
}

/// Start the native executable, falling back to the script backend when the
/// executable is missing or refuses to spawn.
pub fn start_with_fallback(config: &SupervisorConfig) -> ProcessResult<BackendProcess> {
    let executable_failure = match locate_executable(config) {
        Some(path) => {
            match BackendProcess::spawn(LaunchSpec::Executable { path }, config.forward_output) {
                Ok(process) => return Ok(process),
                Err(e) => {
                    warn!("{}, trying script fallback", e);
                    e.to_string()
                }
            }
        }
        None => {
            warn!(
                "No '{}' found in executable search paths, trying script fallback",
                config.executable_name
            );
            format!("'{}' not found", config.executable_name)
        }
    };

    let script_failure = match locate_script(config) {
        Some(location) => {
            let spec = LaunchSpec::Script {
                interpreter: config.interpreter.clone(),
                location,
            };
            match BackendProcess::spawn(spec, config.forward_output) {
                Ok(mut process) => {
                    process.fallback_reason = Some(executable_failure);
                    return Ok(process);
                }
                Err(e) => e.to_string(),
            }
        }
        None => format!("'{}' not found", config.script_name),
    };

    Err(ProcessError::Unavailable {
        executable: executable_failure,
        script: script_failure,
    })
}

/// Working directory a launch runs in
pub fn working_dir(spec: &LaunchSpec) -> Option<&Path> {
    match spec {
        LaunchSpec::Executable { path } => path.parent(),
        LaunchSpec::Script { location, .. } => Some(&location.dir),
    }
}
