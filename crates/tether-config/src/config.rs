use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::LaunchRequest;

use crate::error::ConfigError;

/// Placeholder replaced by the project directory in launch settings.
pub const PROJECT_PATH_VAR: &str = "${project_path}";

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// How the backend process is started and torn down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Debug adapter executable driven by the backend.
    #[serde(default = "default_adapter")]
    pub adapter: String,
    /// Inclusive range the RPC port is drawn from.
    #[serde(default = "default_port_range")]
    pub port_range: [u16; 2],
    /// Wait between spawning the backend and the first call.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u64,
    /// Delay between observing `exited` and backend self-shutdown.
    #[serde(default = "default_exit_grace")]
    pub exit_grace_ms: u64,
}

fn default_adapter() -> String {
    "lldb-dap".to_string()
}
fn default_port_range() -> [u16; 2] {
    [12000, 13000]
}
fn default_startup_delay() -> u64 {
    500
}
fn default_exit_grace() -> u64 {
    2000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            port_range: default_port_range(),
            startup_delay_ms: default_startup_delay(),
            exit_grace_ms: default_exit_grace(),
        }
    }
}

impl BackendConfig {
    /// Startup delay as a [`Duration`].
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Exit grace period as a [`Duration`].
    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

/// Status poller cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval between status/output ticks (minimum 100).
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Interval between status checks while waiting for the first stop.
    #[serde(default = "default_initial_stop_interval")]
    pub initial_stop_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    1000
}
fn default_initial_stop_interval() -> u64 {
    500
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            initial_stop_interval_ms: default_initial_stop_interval(),
        }
    }
}

impl PollConfig {
    /// Tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Initial-stop check interval as a [`Duration`].
    pub fn initial_stop_interval(&self) -> Duration {
        Duration::from_millis(self.initial_stop_interval_ms)
    }
}

/// Transient-error retry discipline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Sleep between attempts (minimum 1).
    #[serde(default = "default_retry_interval")]
    pub interval_ms: u64,
    /// Give up after this long; absent means retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

fn default_retry_interval() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_retry_interval(),
            deadline_ms: None,
        }
    }
}

impl RetryConfig {
    /// Retry sleep as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Deadline as a [`Duration`], if bounded.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// What to debug and how to launch it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Executable to debug; `${project_path}` is substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Command-line arguments.
    #[serde(default)]
    pub params: Vec<String>,
    /// Environment for the debuggee; absent inherits the backend's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
    /// Extra module search path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Working directory; `${project_path}` is substituted. Defaults to
    /// the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl DebugConfig {
    /// Build the launch request for a project rooted at `project`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingExecutable`] when no executable is set.
    pub fn launch_request(&self, project: &Path) -> Result<LaunchRequest, ConfigError> {
        let executable = self
            .executable
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(ConfigError::MissingExecutable)?;
        let working_dir = match &self.working_dir {
            Some(dir) => PathBuf::from(substitute(dir, project)),
            None => project.to_path_buf(),
        };
        Ok(LaunchRequest {
            executable: PathBuf::from(substitute(executable, project)),
            args: self.params.clone(),
            env: self.environment.clone(),
            module_search_path: self.path.as_ref().map(PathBuf::from),
            working_dir: Some(working_dir),
        })
    }
}

fn substitute(value: &str, project: &Path) -> String {
    value.replace(PROJECT_PATH_VAR, &project.to_string_lossy())
}

/// Console front end settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Show the debugger console when a session starts.
    #[serde(default = "default_true")]
    pub auto_show: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { auto_show: true }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Top-level tether configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend process settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Poller cadence.
    #[serde(default)]
    pub poll: PollConfig,
    /// Retry discipline.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Launch settings.
    #[serde(default)]
    pub debug: DebugConfig,
    /// Console front end.
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.backend.adapter, "lldb-dap");
        assert_eq!(cfg.backend.port_range, [12000, 13000]);
        assert_eq!(cfg.backend.startup_delay(), Duration::from_millis(500));
        assert_eq!(cfg.backend.exit_grace(), Duration::from_secs(2));
        assert_eq!(cfg.poll.interval(), Duration::from_secs(1));
        assert_eq!(cfg.poll.initial_stop_interval_ms, 500);
        assert_eq!(cfg.retry.interval(), Duration::from_millis(200));
        assert_eq!(cfg.retry.deadline(), None);
        assert!(cfg.debug.executable.is_none());
        assert!(cfg.console.auto_show);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let cfg = Config {
            backend: BackendConfig {
                adapter: "/opt/llvm/bin/lldb-dap".into(),
                port_range: [20000, 20010],
                startup_delay_ms: 100,
                exit_grace_ms: 0,
            },
            poll: PollConfig {
                interval_ms: 250,
                initial_stop_interval_ms: 50,
            },
            retry: RetryConfig {
                interval_ms: 10,
                deadline_ms: Some(5000),
            },
            debug: DebugConfig {
                executable: Some("${project_path}/build/app".into()),
                params: vec!["--verbose".into()],
                environment: Some(BTreeMap::from([("RUST_LOG".into(), "debug".into())])),
                path: Some("/opt/sdk/lib".into()),
                working_dir: None,
            },
            console: ConsoleConfig { auto_show: false },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/tether.log")),
            },
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let back: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, back);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn launch_request_substitutes_project_path() {
        let debug = DebugConfig {
            executable: Some("${project_path}/target/debug/demo".into()),
            params: vec!["-n".into(), "3".into()],
            working_dir: Some("${project_path}/run".into()),
            ..DebugConfig::default()
        };
        let req = debug.launch_request(Path::new("/work/demo")).unwrap();
        assert_eq!(req.executable, PathBuf::from("/work/demo/target/debug/demo"));
        assert_eq!(req.args, vec!["-n", "3"]);
        assert_eq!(req.working_dir, Some(PathBuf::from("/work/demo/run")));
        assert_eq!(req.env, None);
        assert_eq!(req.module_search_path, None);
    }

    #[test]
    fn launch_request_defaults_working_dir_to_project() {
        let debug = DebugConfig {
            executable: Some("/bin/true".into()),
            path: Some("/opt/lib".into()),
            ..DebugConfig::default()
        };
        let req = debug.launch_request(Path::new("/work/demo")).unwrap();
        assert_eq!(req.working_dir, Some(PathBuf::from("/work/demo")));
        assert_eq!(req.module_search_path, Some(PathBuf::from("/opt/lib")));
    }

    #[test]
    fn launch_request_requires_executable() {
        let err = DebugConfig::default()
            .launch_request(Path::new("/work"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingExecutable));

        let blank = DebugConfig {
            executable: Some("  ".into()),
            ..DebugConfig::default()
        };
        assert!(blank.launch_request(Path::new("/work")).is_err());
    }

    #[test]
    fn log_level_filters() {
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::default().as_filter(), "info");
    }
}
