//! Assertion outcomes and test reports.

use std::fmt::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use serde::Serialize;

use crate::config::ReportFormat;
use crate::error::HarnessError;

/// Characters of actual output shown per failed assertion.
const ACTUAL_TAIL_CHARS: usize = 160;

/// What kind of check produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A pattern was waited for.
    Expectation,
    /// The shell was expected to exit.
    Exit,
    /// Input could not be delivered.
    Send,
    /// The shell could not be started or synchronized with.
    Startup,
    /// The script itself failed or panicked.
    Script,
}

/// Result of a single assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionOutcome {
    /// Whether the assertion held.
    pub passed: bool,
    /// What was being checked.
    pub description: String,
    /// Kind of check.
    pub kind: OutcomeKind,
    /// What was expected, for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// What was observed, for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl AssertionOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn pass(kind: OutcomeKind, description: impl Into<String>) -> Self {
        Self {
            passed: true,
            description: description.into(),
            kind,
            expected: None,
            actual: None,
        }
    }

    /// A failing outcome built from the error that caused it.
    #[must_use]
    pub fn fail(kind: OutcomeKind, description: impl Into<String>, err: &HarnessError) -> Self {
        let (expected, actual) = match err {
            HarnessError::Timeout {
                pattern, buffer, ..
            } => (Some(pattern.clone()), Some(tail(buffer))),
            HarnessError::UnexpectedExit {
                state,
                pattern,
                buffer,
            } => {
                let what = if state.is_crash() { "shell crashed" } else { "shell exited" };
                (
                    Some(pattern.clone()),
                    Some(format!("{what} ({state}) after {}", tail(buffer))),
                )
            }
            other => (None, Some(other.to_string())),
        };
        Self {
            passed: false,
            description: description.into(),
            kind,
            expected,
            actual,
        }
    }

    /// The one-line summary printed for a failure.
    #[must_use]
    pub fn failure_line(&self) -> String {
        let mut line = format!("FAIL {}", self.description);
        match (&self.expected, &self.actual) {
            (Some(expected), Some(actual)) => {
                let _ = write!(line, ": expected {expected}, got {actual}");
            }
            (None, Some(actual)) => {
                let _ = write!(line, ": {actual}");
            }
            _ => {}
        }
        line
    }
}

/// Escaped tail of the buffer, short enough for one line.
fn tail(buffer: &str) -> String {
    if buffer.is_empty() {
        return "no output".to_string();
    }
    let count = buffer.chars().count();
    let shown: String = buffer
        .chars()
        .skip(count.saturating_sub(ACTUAL_TAIL_CHARS))
        .collect();
    let prefix = if count > ACTUAL_TAIL_CHARS { "..." } else { "" };
    format!("\"{prefix}{}\"", shown.escape_debug())
}

/// Overall status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Every assertion passed.
    Success,
    /// At least one assertion failed.
    Failure,
}

/// Aggregated outcome of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// Test name.
    pub name: String,
    /// Outcomes in the order the assertions ran.
    pub outcomes: Vec<AssertionOutcome>,
    /// Overall status.
    pub status: TestStatus,
    /// Wall-clock time from start to finish.
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    /// Problems during cleanup. They never change the status.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<String>,
}

fn as_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl TestResult {
    /// An empty, successful result.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Vec::new(),
            status: TestStatus::Success,
            duration: Duration::ZERO,
            cleanup_errors: Vec::new(),
        }
    }

    /// Append an outcome, updating the status.
    pub fn record(&mut self, outcome: AssertionOutcome) {
        if !outcome.passed {
            self.status = TestStatus::Failure;
        }
        self.outcomes.push(outcome);
    }

    /// Whether every assertion passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TestStatus::Success
    }

    /// The failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// Process exit code: 0 on success, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Render the report in the given format.
    #[must_use]
    pub fn render(&self, format: ReportFormat) -> Option<String> {
        match format {
            ReportFormat::Human => Some(self.render_human()),
            ReportFormat::Json => Some(
                serde_json::to_string_pretty(self)
                    .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")),
            ),
            ReportFormat::Quiet => None,
        }
    }

    fn render_human(&self) -> String {
        let mut out = String::new();
        for failure in self.failures() {
            let _ = writeln!(out, "{}", failure.failure_line());
        }
        for problem in &self.cleanup_errors {
            let _ = writeln!(out, "WARN cleanup: {problem}");
        }
        let total = self.outcomes.len();
        let failed = self.failures().count();
        let ms = self.duration.as_millis();
        if self.is_success() {
            let _ = write!(out, "PASS {} ({total} assertions, {ms} ms)", self.name);
        } else {
            let _ = write!(
                out,
                "FAIL {} ({failed} of {total} assertions failed, {ms} ms)",
                self.name
            );
        }
        out
    }
}

impl From<&TestResult> for ExitCode {
    fn from(result: &TestResult) -> Self {
        if result.is_success() {
            Self::SUCCESS
        } else {
            Self::FAILURE
        }
    }
}
