//! Configuration types for shell-harness.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `SHELL_HARNESS_*` environment variables. See [`HarnessConfig::load`].

pub mod env;
pub mod file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shell_pty::PtyCommand;

use crate::error::{HarnessError, Result};
use crate::expect::{DEFAULT_MAX_SIZE, DEFAULT_POLL_INTERVAL, PromptPattern};

/// Default timeout for expectations (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for the shell to print its first prompt.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time between SIGHUP and SIGKILL when closing a session.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Default shell under test.
pub const DEFAULT_SHELL: &str = "./cush";

/// Default terminal width.
pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Default terminal height.
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 24;

/// Default TERM environment variable value.
///
/// Escape sequences are not interpreted, so the shell is asked not to emit
/// any.
pub const DEFAULT_TERM: &str = "dumb";

/// How to launch the shell under test.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Path to the executable.
    pub path: PathBuf,

    /// Command arguments.
    pub args: Vec<String>,

    /// Environment variables to set.
    pub env: HashMap<String, String>,

    /// Environment variables to remove.
    pub env_remove: Vec<String>,

    /// Whether to inherit the parent environment.
    pub inherit_env: bool,

    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,

    /// Terminal dimensions (width, height).
    pub dimensions: (u16, u16),

    /// Line ending appended by `send_line`.
    pub line_ending: LineEnding,
}

impl Default for ShellConfig {
    fn default() -> Self {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), DEFAULT_TERM.to_string());

        Self {
            path: PathBuf::from(DEFAULT_SHELL),
            args: Vec::new(),
            env,
            env_remove: Vec::new(),
            inherit_env: true,
            working_dir: None,
            dimensions: (DEFAULT_TERMINAL_WIDTH, DEFAULT_TERMINAL_HEIGHT),
            line_ending: LineEnding::default(),
        }
    }
}

impl ShellConfig {
    /// Launch the executable at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the command arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Remove an environment variable.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.env.remove(&key);
        self.env_remove.push(key);
        self
    }

    /// Set whether to inherit the parent environment.
    #[must_use]
    pub const fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Set the terminal dimensions.
    #[must_use]
    pub const fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.dimensions = (width, height);
        self
    }

    /// Set the line ending.
    #[must_use]
    pub const fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// The command line, for logs and messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.path.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn pty_command(&self) -> PtyCommand {
        let mut command = PtyCommand::new(&self.path);
        command
            .args(&self.args)
            .size(self.dimensions.0, self.dimensions.1);
        if !self.inherit_env {
            command.env_clear();
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        for key in &self.env_remove {
            command.env_remove(key);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

/// Line ending styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Unix-style line ending (LF).
    #[default]
    Lf,

    /// Windows-style line ending (CRLF).
    CrLf,

    /// Carriage return, as a terminal's Enter key sends.
    Cr,
}

impl LineEnding {
    /// Get the line ending as bytes.
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
            Self::Cr => b"\r",
        }
    }
}

/// Format of the per-test report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// One line per failed assertion and a PASS/FAIL summary.
    #[default]
    Human,

    /// The whole result as a JSON object.
    Json,

    /// No report is printed.
    Quiet,
}

impl std::str::FromStr for ReportFormat {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "quiet" | "none" => Ok(Self::Quiet),
            other => Err(HarnessError::config(format!("unknown report format: {other}"))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-field human-readable lines.
    #[default]
    Full,

    /// Shorter single-line output.
    Compact,

    /// Newline-delimited JSON.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,

    /// Log format.
    pub format: LogFormat,

    /// Whether to colorize output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            format: LogFormat::default(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Set the filter directive.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Set the log format.
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// The shell under test.
    pub shell: ShellConfig,

    /// Pattern marking that the shell is ready for input.
    pub prompt: PromptPattern,

    /// Timeout for expectations that do not name one.
    pub default_timeout: Duration,

    /// Time allowed for the first prompt.
    pub startup_timeout: Duration,

    /// Interval between liveness checks while waiting.
    pub poll_interval: Duration,

    /// Time between SIGHUP and SIGKILL on close.
    pub close_grace: Duration,

    /// Retained output size before consumed output is discarded.
    pub buffer_max_size: usize,

    /// Report printed when a test finishes.
    pub report: ReportFormat,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            prompt: PromptPattern::default(),
            default_timeout: DEFAULT_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            close_grace: DEFAULT_CLOSE_GRACE,
            buffer_max_size: DEFAULT_MAX_SIZE,
            report: ReportFormat::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Test the shell at `path` with default settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            shell: ShellConfig::new(path),
            ..Default::default()
        }
    }

    /// Defaults, then the file named by `SHELL_HARNESS_CONFIG` if set, then
    /// `SHELL_HARNESS_*` overrides.
    pub fn load() -> Result<Self> {
        let env = env::EnvConfig::default();
        let mut config = Self::default();
        if let Some(path) = env.get("CONFIG") {
            file::FileConfig::load(Path::new(&path))?.apply(&mut config)?;
        }
        env.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        file::FileConfig::load(path.as_ref())?.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the shell configuration.
    #[must_use]
    pub fn shell(mut self, shell: ShellConfig) -> Self {
        self.shell = shell;
        self
    }

    /// Set the prompt pattern.
    #[must_use]
    pub fn prompt(mut self, prompt: PromptPattern) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set the default expectation timeout.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the startup timeout.
    #[must_use]
    pub const fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the close grace period.
    #[must_use]
    pub const fn close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Set the retained buffer size.
    #[must_use]
    pub const fn buffer_max_size(mut self, size: usize) -> Self {
        self.buffer_max_size = size;
        self
    }

    /// Set the report format.
    #[must_use]
    pub const fn report(mut self, report: ReportFormat) -> Self {
        self.report = report;
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Reject settings that would make every wait fail or spin.
    pub fn validate(&self) -> Result<()> {
        if self.shell.path.as_os_str().is_empty() {
            return Err(HarnessError::config("shell path is empty"));
        }
        if self.default_timeout.is_zero() || self.startup_timeout.is_zero() {
            return Err(HarnessError::config("timeouts must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(HarnessError::config("poll interval must be greater than zero"));
        }
        if self.buffer_max_size == 0 {
            return Err(HarnessError::config("buffer size must be greater than zero"));
        }
        Ok(())
    }
}
