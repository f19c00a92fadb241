//! File-based configuration loading.
//!
//! ```toml
//! # A regular expression; use `prompt_literal` to match text verbatim.
//! prompt = 'cush> $'
//! default_timeout_ms = 5000
//! report = "json"
//!
//! [shell]
//! path = "./cush"
//! args = []
//! env = { HOME = "/tmp/home" }
//!
//! [logging]
//! filter = "shell_harness=debug"
//! format = "compact"
//! ```
//!
//! Every field is optional; missing fields keep their current value.
//! `prompt` and `prompt_literal` cannot both be set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::{HarnessConfig, LineEnding, LogFormat, ReportFormat};
use crate::error::{HarnessError, Result};
use crate::expect::PromptPattern;

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Prompt regex.
    pub prompt: Option<String>,
    /// Prompt text matched verbatim.
    pub prompt_literal: Option<String>,
    /// Default expectation timeout in milliseconds.
    pub default_timeout_ms: Option<u64>,
    /// Startup timeout in milliseconds.
    pub startup_timeout_ms: Option<u64>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Close grace period in milliseconds.
    pub close_grace_ms: Option<u64>,
    /// Retained buffer size in bytes.
    pub buffer_max_size: Option<usize>,
    /// Report format.
    pub report: Option<ReportFormat>,
    /// Shell settings.
    #[serde(default)]
    pub shell: ShellSection,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[shell]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellSection {
    /// Executable path.
    pub path: Option<PathBuf>,
    /// Arguments.
    pub args: Option<Vec<String>>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether to inherit the parent environment.
    pub inherit_env: Option<bool>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Terminal size as `[width, height]`.
    pub dimensions: Option<(u16, u16)>,
    /// Line ending for `send_line`.
    pub line_ending: Option<LineEnding>,
}

/// `[logging]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive.
    pub filter: Option<String>,
    /// Output format.
    pub format: Option<LogFormat>,
    /// Colorized output.
    pub ansi: Option<bool>,
}

impl FileConfig {
    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| HarnessError::config(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HarnessError::config(e.to_string()))
    }

    /// Overlay the fields that are present onto `config`.
    pub fn apply(self, config: &mut HarnessConfig) -> Result<()> {
        match (self.prompt, self.prompt_literal) {
            (Some(_), Some(_)) => {
                return Err(HarnessError::config(
                    "prompt and prompt_literal are mutually exclusive",
                ));
            }
            (Some(regex), None) => config.prompt = PromptPattern::new(&regex)?,
            (None, Some(text)) => config.prompt = PromptPattern::literal(text),
            (None, None) => {}
        }
        if let Some(ms) = self.default_timeout_ms {
            config.default_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.startup_timeout_ms {
            config.startup_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.close_grace_ms {
            config.close_grace = Duration::from_millis(ms);
        }
        if let Some(size) = self.buffer_max_size {
            config.buffer_max_size = size;
        }
        if let Some(report) = self.report {
            config.report = report;
        }

        let shell = self.shell;
        if let Some(path) = shell.path {
            config.shell.path = path;
        }
        if let Some(args) = shell.args {
            config.shell.args = args;
        }
        config.shell.env.extend(shell.env);
        if let Some(inherit) = shell.inherit_env {
            config.shell.inherit_env = inherit;
        }
        if let Some(dir) = shell.working_dir {
            config.shell.working_dir = Some(dir);
        }
        if let Some(dimensions) = shell.dimensions {
            config.shell.dimensions = dimensions;
        }
        if let Some(line_ending) = shell.line_ending {
            config.shell.line_ending = line_ending;
        }

        let logging = self.logging;
        if let Some(filter) = logging.filter {
            config.logging.filter = filter;
        }
        if let Some(format) = logging.format {
            config.logging.format = format;
        }
        if let Some(ansi) = logging.ansi {
            config.logging.ansi = ansi;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
prompt = '\$ $'
default_timeout_ms = 2500
report = "json"

[shell]
path = "/bin/sh"
args = ["-i"]
env = { PS1 = "$ " }
dimensions = [120, 40]
line_ending = "cr"

[logging]
filter = "debug"
format = "compact"
"#;

    #[test]
    fn full_file_applies() {
        let mut config = HarnessConfig::default();
        FileConfig::parse(SAMPLE).unwrap().apply(&mut config).unwrap();

        assert_eq!(config.prompt.as_str(), r"\$ $");
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.report, ReportFormat::Json);
        assert_eq!(config.shell.path, PathBuf::from("/bin/sh"));
        assert_eq!(config.shell.args, vec!["-i".to_string()]);
        assert_eq!(config.shell.env.get("PS1").map(String::as_str), Some("$ "));
        assert_eq!(config.shell.env.get("TERM").map(String::as_str), Some("dumb"));
        assert_eq!(config.shell.dimensions, (120, 40));
        assert_eq!(config.shell.line_ending, LineEnding::Cr);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn prompt_literal_skips_regex_compilation() {
        let mut config = HarnessConfig::default();
        FileConfig::parse("prompt_literal = '[$] '")
            .unwrap()
            .apply(&mut config)
            .unwrap();
        assert_eq!(config.prompt.as_str(), "[$] ");
        assert_eq!(config.prompt.find(b"[$] "), Some((0, 4)));
    }

    #[test]
    fn prompt_and_prompt_literal_conflict() {
        let mut config = HarnessConfig::default();
        let err = FileConfig::parse("prompt = 'a'\nprompt_literal = 'a'")
            .unwrap()
            .apply(&mut config)
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn empty_file_changes_nothing() {
        let mut config = HarnessConfig::default();
        FileConfig::parse("").unwrap().apply(&mut config).unwrap();
        assert_eq!(config.default_timeout, super::super::DEFAULT_TIMEOUT);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            FileConfig::parse("tiemout = 5"),
            Err(HarnessError::Config { .. })
        ));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "poll_interval_ms = 10\n").unwrap();

        let config = HarnessConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = FileConfig::load(Path::new("/nonexistent/harness.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
