//! Environment-based configuration.
//!
//! | Variable                          | Setting             |
//! |-----------------------------------|---------------------|
//! | `SHELL_HARNESS_CONFIG`            | TOML file to load   |
//! | `SHELL_HARNESS_SHELL`             | shell executable    |
//! | `SHELL_HARNESS_PROMPT`            | prompt, as a regex  |
//! | `SHELL_HARNESS_PROMPT_LITERAL`    | prompt, matched verbatim |
//! | `SHELL_HARNESS_TIMEOUT_MS`        | default timeout     |
//! | `SHELL_HARNESS_STARTUP_TIMEOUT_MS`| startup timeout     |
//! | `SHELL_HARNESS_POLL_MS`           | poll interval       |
//! | `SHELL_HARNESS_CLOSE_GRACE_MS`    | SIGHUP grace period |
//! | `SHELL_HARNESS_LOG`               | log filter          |
//! | `SHELL_HARNESS_LOG_FORMAT`        | `full`/`compact`/`json` |
//! | `SHELL_HARNESS_REPORT`            | `human`/`json`/`quiet`  |
//!
//! `SHELL_HARNESS_PROMPT` is compiled as a regular expression, so a prompt
//! such as `$ ` must be escaped (`\$ `). Use `SHELL_HARNESS_PROMPT_LITERAL`
//! to match the text as written. Setting both is an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::{HarnessConfig, LogFormat};
use crate::error::{HarnessError, Result};
use crate::expect::PromptPattern;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "SHELL_HARNESS";

/// Environment variable reader.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
    /// Fixed variables used instead of the process environment.
    vars: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Read variables with the given prefix from the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read variables from a fixed set instead of the process environment.
    #[must_use]
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        let value = match &self.vars {
            Some(vars) => vars.get(&var_name).cloned(),
            None => std::env::var(&var_name).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Get a parsed value, failing on malformed input.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|value| {
                value.parse().map_err(|_| {
                    HarnessError::config(format!("invalid value for {}: {value:?}", self.var_name(name)))
                })
            })
            .transpose()
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in milliseconds.
    pub fn duration_millis(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }

    /// Overlay the variables that are set onto `config`.
    pub fn apply(&self, config: &mut HarnessConfig) -> Result<()> {
        if let Some(shell) = self.get("SHELL") {
            config.shell.path = PathBuf::from(shell);
        }
        match (self.get("PROMPT"), self.get("PROMPT_LITERAL")) {
            (Some(_), Some(_)) => {
                return Err(HarnessError::config(format!(
                    "{} and {} are mutually exclusive",
                    self.var_name("PROMPT"),
                    self.var_name("PROMPT_LITERAL")
                )));
            }
            (Some(regex), None) => config.prompt = PromptPattern::new(&regex)?,
            (None, Some(text)) => config.prompt = PromptPattern::literal(text),
            (None, None) => {}
        }
        if let Some(timeout) = self.duration_millis("TIMEOUT_MS")? {
            config.default_timeout = timeout;
        }
        if let Some(timeout) = self.duration_millis("STARTUP_TIMEOUT_MS")? {
            config.startup_timeout = timeout;
        }
        if let Some(interval) = self.duration_millis("POLL_MS")? {
            config.poll_interval = interval;
        }
        if let Some(grace) = self.duration_millis("CLOSE_GRACE_MS")? {
            config.close_grace = grace;
        }
        if let Some(filter) = self.get("LOG") {
            config.logging.filter = filter;
        }
        if let Some(format) = self.get("LOG_FORMAT") {
            config.logging.format = match format.to_lowercase().as_str() {
                "full" => LogFormat::Full,
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                other => {
                    return Err(HarnessError::config(format!("unknown log format: {other}")));
                }
            };
        }
        if let Some(ansi) = self.bool("LOG_ANSI") {
            config.logging.ansi = ansi;
        }
        if let Some(report) = self.parse("REPORT")? {
            config.report = report;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportFormat;

    fn env(vars: &[(&str, &str)]) -> EnvConfig {
        EnvConfig::from_vars(DEFAULT_PREFIX, vars.iter().copied())
    }

    #[test]
    fn overrides_apply() {
        let mut config = HarnessConfig::default();
        env(&[
            ("SHELL_HARNESS_SHELL", "/usr/local/bin/cush"),
            ("SHELL_HARNESS_TIMEOUT_MS", "2500"),
            ("SHELL_HARNESS_POLL_MS", "20"),
            ("SHELL_HARNESS_REPORT", "json"),
            ("SHELL_HARNESS_LOG", "shell_harness=debug"),
        ])
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.shell.path, PathBuf::from("/usr/local/bin/cush"));
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.report, ReportFormat::Json);
        assert_eq!(config.logging.filter, "shell_harness=debug");
    }

    #[test]
    fn unset_variables_leave_defaults() {
        let mut config = HarnessConfig::default();
        env(&[("OTHER_PREFIX_SHELL", "/bin/zsh")]).apply(&mut config).unwrap();
        assert_eq!(config.shell.path, PathBuf::from(crate::config::DEFAULT_SHELL));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let mut config = HarnessConfig::default();
        let err = env(&[("SHELL_HARNESS_TIMEOUT_MS", "soon")])
            .apply(&mut config)
            .unwrap_err();
        assert!(err.to_string().contains("SHELL_HARNESS_TIMEOUT_MS"));
    }

    #[test]
    fn prompt_override_is_compiled() {
        let mut config = HarnessConfig::default();
        env(&[("SHELL_HARNESS_PROMPT", r"\$ $")]).apply(&mut config).unwrap();
        assert_eq!(config.prompt.as_str(), r"\$ $");

        let err = env(&[("SHELL_HARNESS_PROMPT", "(")]).apply(&mut config);
        assert!(matches!(err, Err(HarnessError::InvalidPattern { .. })));
    }

    #[test]
    fn literal_prompt_is_matched_verbatim() {
        let mut config = HarnessConfig::default();
        env(&[("SHELL_HARNESS_PROMPT_LITERAL", "$ ")])
            .apply(&mut config)
            .unwrap();
        assert_eq!(config.prompt.as_str(), "$ ");
        assert_eq!(config.prompt.find(b"output\r\n$ "), Some((8, 10)));
    }

    #[test]
    fn both_prompt_forms_are_rejected() {
        let mut config = HarnessConfig::default();
        let err = env(&[
            ("SHELL_HARNESS_PROMPT", r"\$ "),
            ("SHELL_HARNESS_PROMPT_LITERAL", "$ "),
        ])
        .apply(&mut config)
        .unwrap_err();
        assert!(matches!(err, HarnessError::Config { .. }));
        assert!(err.to_string().contains("SHELL_HARNESS_PROMPT_LITERAL"));
    }

    #[test]
    fn bool_values() {
        let e = env(&[("SHELL_HARNESS_A", "yes"), ("SHELL_HARNESS_B", "0")]);
        assert_eq!(e.bool("a"), Some(true));
        assert_eq!(e.bool("b"), Some(false));
        assert_eq!(e.bool("c"), None);
    }
}
