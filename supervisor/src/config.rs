//! Supervisor configuration.
//!
//! Everything the supervisor needs to find, launch and check the backend lives
//! in [`SupervisorConfig`]. Values come from built-in defaults, an optional
//! TOML file and finally command-line overrides, in that order.

use client::{ApiConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Stem of the native backend binary.
pub const EXECUTABLE_STEM: &str = "horary-backend";

/// Entry point of the script backend.
pub const SCRIPT_NAME: &str = "app.py";

/// Forces the script backend to flush its output line by line.
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Platform file name of the native backend.
pub fn default_executable_name() -> String {
    if cfg!(windows) {
        format!("{}.exe", EXECUTABLE_STEM)
    } else {
        EXECUTABLE_STEM.to_string()
    }
}

pub fn default_interpreter() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

/// Ordered directories searched for the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPaths {
    pub executable_roots: Vec<PathBuf>,
    pub script_roots: Vec<PathBuf>,
}

impl SearchPaths {
    /// Default search order below `base_dir`. A packaged build keeps the
    /// backend under `resources/`, a development checkout under `backend/`.
    pub fn defaults(base_dir: &Path, packaged: bool) -> Self {
        let executable: &[&str] = if packaged {
            &["resources/backend", "resources", "backend", "."]
        } else {
            &["backend/dist", "backend/target/release", "dist", "."]
        };
        let script: &[&str] = if packaged {
            &["resources/backend", "resources"]
        } else {
            &["backend", "."]
        };

        Self {
            executable_roots: executable.iter().map(|p| base_dir.join(p)).collect(),
            script_roots: script.iter().map(|p| base_dir.join(p)).collect(),
        }
    }
}

/// Sample inputs sent to the computation endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointInputs {
    pub timezone_location: String,
    pub chart_question: String,
    pub chart_location: String,
    pub use_current_time: bool,
}

impl Default for EndpointInputs {
    fn default() -> Self {
        Self {
            timezone_location: "London, UK".to_string(),
            chart_question: "Will I get the job?".to_string(),
            chart_location: "London, UK".to_string(),
            use_current_time: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub host: String,
    pub port: u16,
    /// Directory the default search locations are rooted at
    pub base_dir: PathBuf,
    /// Running from a distributed build rather than a checkout
    pub packaged: bool,
    /// Explicit executable search roots, replacing the defaults
    pub executable_roots: Option<Vec<PathBuf>>,
    /// Explicit script search roots, replacing the defaults
    pub script_roots: Option<Vec<PathBuf>>,
    pub executable_name: String,
    pub script_name: String,
    pub interpreter: String,
    /// Give up waiting for a healthy backend after this long
    pub health_timeout: Duration,
    /// Delay between health checks
    pub poll_interval: Duration,
    /// Per-request timeout for endpoint calls
    pub request_timeout: Duration,
    /// How long a terminated backend gets to exit before it is killed
    pub stop_grace: Duration,
    /// Forward backend stdout/stderr to the log
    pub forward_output: bool,
    pub inputs: EndpointInputs,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_dir: PathBuf::from("."),
            packaged: false,
            executable_roots: None,
            script_roots: None,
            executable_name: default_executable_name(),
            script_name: SCRIPT_NAME.to_string(),
            interpreter: default_interpreter(),
            health_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stop_grace: Duration::from_secs(5),
            forward_output: true,
            inputs: EndpointInputs::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_packaged(mut self, packaged: bool) -> Self {
        self.packaged = packaged;
        self
    }

    pub fn with_search_roots(
        mut self,
        executable_roots: Vec<PathBuf>,
        script_roots: Vec<PathBuf>,
    ) -> Self {
        self.executable_roots = Some(executable_roots);
        self.script_roots = Some(script_roots);
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_forward_output(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    /// Effective search locations: explicit roots when configured, the
    /// packaging-mode defaults otherwise. Relative roots resolve against
    /// `base_dir`.
    pub fn search_paths(&self) -> SearchPaths {
        let defaults = SearchPaths::defaults(&self.base_dir, self.packaged);
        let resolve = |roots: &Vec<PathBuf>| -> Vec<PathBuf> {
            roots.iter().map(|root| self.base_dir.join(root)).collect()
        };

        SearchPaths {
            executable_roots: self
                .executable_roots
                .as_ref()
                .map(resolve)
                .unwrap_or(defaults.executable_roots),
            script_roots: self
                .script_roots
                .as_ref()
                .map(resolve)
                .unwrap_or(defaults.script_roots),
        }
    }

    /// Client settings for talking to the backend.
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::from_host_port(&self.host, self.port).with_request_timeout(self.request_timeout)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.host.trim().is_empty() {
            return invalid("Host cannot be empty");
        }

        if self.port == 0 {
            return invalid("Port must be greater than 0");
        }

        if self.health_timeout.is_zero() {
            return invalid("Health timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            return invalid("Poll interval must be greater than 0");
        }

        if self.poll_interval > self.health_timeout {
            return invalid("Poll interval cannot exceed the health timeout");
        }

        if self.executable_name.is_empty() || self.script_name.is_empty() {
            return invalid("Executable and script names cannot be empty");
        }

        if self.interpreter.is_empty() {
            return invalid("Interpreter cannot be empty");
        }

        self.api_config()
            .validate()
            .map_err(|message| ConfigError::Invalid { message })
    }
}

/// On-disk form of the configuration. Every field is optional and only
/// overrides the defaults it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub packaged: Option<bool>,
    pub executable_name: Option<String>,
    pub script_name: Option<String>,
    pub interpreter: Option<String>,
    pub executable_roots: Option<Vec<PathBuf>>,
    pub script_roots: Option<Vec<PathBuf>>,
    pub health_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub stop_grace_ms: Option<u64>,
    pub forward_output: Option<bool>,
    pub inputs: Option<EndpointInputs>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay the values present in this file onto `config`.
    pub fn apply(self, mut config: SupervisorConfig) -> SupervisorConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(packaged) = self.packaged {
            config.packaged = packaged;
        }
        if let Some(name) = self.executable_name {
            config.executable_name = name;
        }
        if let Some(name) = self.script_name {
            config.script_name = name;
        }
        if let Some(interpreter) = self.interpreter {
            config.interpreter = interpreter;
        }
        if self.executable_roots.is_some() {
            config.executable_roots = self.executable_roots;
        }
        if self.script_roots.is_some() {
            config.script_roots = self.script_roots;
        }
        if let Some(secs) = self.health_timeout_secs {
            config.health_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stop_grace_ms {
            config.stop_grace = Duration::from_millis(ms);
        }
        if let Some(forward) = self.forward_output {
            config.forward_output = forward;
        }
        if let Some(inputs) = self.inputs {
            config.inputs = inputs;
        }
        config
    }
}

/// Command-line settings. They win over both the defaults and the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub health_timeout_secs: Option<u64>,
    /// Only ever switches packaged mode on
    pub packaged: bool,
    pub base_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, mut config: SupervisorConfig) -> SupervisorConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.health_timeout_secs {
            config.health_timeout = Duration::from_secs(secs);
        }
        if self.packaged {
            config.packaged = true;
        }
        if let Some(base_dir) = self.base_dir {
            config.base_dir = base_dir;
        }
        config
    }
}

impl SupervisorConfig {
    /// Defaults, then the optional TOML file, then `overrides`. The result is
    /// validated.
    pub fn load(file: Option<&Path>, overrides: Overrides) -> ConfigResult<Self> {
        let mut config = Self::default();
        if let Some(path) = file {
            config = ConfigFile::from_path(path)?.apply(config);
        }
        let config = overrides.apply(config);
        config.validate()?;
        Ok(config)
    }
}
