//! Error types for shell-harness.
//!
//! Errors carry enough context to explain a failed assertion on their own:
//! timeouts and unexpected exits include the pattern that was pending and the
//! unconsumed output at the moment the wait gave up.

use std::time::Duration;

use thiserror::Error;

use crate::types::ProcessState;

/// Maximum length of buffer content to display in error messages.
const MAX_BUFFER_DISPLAY: usize = 500;

/// Lines of buffer tail shown when the buffer is truncated.
const CONTEXT_LINES: usize = 6;

/// Format buffer content for display, keeping only the tail when large.
pub(crate) fn format_buffer_snippet(buffer: &str) -> String {
    if buffer.is_empty() {
        return "(empty buffer)".to_string();
    }

    let buffer_len = buffer.len();
    let lines: Vec<&str> = buffer.lines().collect();

    if buffer_len <= MAX_BUFFER_DISPLAY || lines.len() <= CONTEXT_LINES {
        return format!(
            "┌─ buffer ({buffer_len} bytes) ──────────────────────\n│ {}\n└────────────────────────────────────────",
            lines.join("\n│ ")
        );
    }

    let tail = &lines[lines.len() - CONTEXT_LINES..];
    let hidden = lines.len() - tail.len();

    format!(
        "┌─ buffer ({buffer_len} bytes, {} lines) ─────────────\n│ ... ({hidden} lines hidden)\n│ {}\n└────────────────────────────────────────",
        lines.len(),
        tail.join("\n│ ")
    )
}

fn format_timeout_error(duration: Duration, pattern: &str, buffer: &str) -> String {
    format!(
        "timeout after {duration:?} waiting for {pattern}\n\n{}",
        format_buffer_snippet(buffer)
    )
}

fn format_unexpected_exit(state: &ProcessState, pattern: &str, buffer: &str) -> String {
    let what = if state.is_crash() {
        format!("shell crashed ({state})")
    } else {
        format!("shell exited too early ({state})")
    };
    format!(
        "{what} while waiting for {pattern}\n\n{}",
        format_buffer_snippet(buffer)
    )
}

/// The main error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The shell could not be started.
    #[error("failed to spawn shell: {0}")]
    Spawn(#[from] SpawnError),

    /// Input could not be delivered to the shell.
    #[error("failed to write to shell: {reason}")]
    Write {
        /// Why the write failed.
        reason: String,
    },

    /// The expected output did not appear in time.
    #[error("{}", format_timeout_error(*duration, pattern, buffer))]
    Timeout {
        /// The timeout that elapsed.
        duration: Duration,
        /// Description of the pending pattern.
        pattern: String,
        /// Unconsumed output when the wait gave up.
        buffer: String,
    },

    /// The shell terminated while an expectation was pending.
    #[error("{}", format_unexpected_exit(state, pattern, buffer))]
    UnexpectedExit {
        /// How the shell terminated.
        state: ProcessState,
        /// Description of the pending pattern.
        pattern: String,
        /// Unconsumed output when the exit was observed.
        buffer: String,
    },

    /// Allocating or releasing the terminal channel or a fixture failed.
    #[error("{context}: {source}")]
    Resource {
        /// What was being allocated or released.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid pattern specification.
    #[error("invalid pattern: {message}")]
    InvalidPattern {
        /// Description of what's wrong with the pattern.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,

    /// The test script panicked.
    #[error("test script panicked: {message}")]
    ScriptPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

/// Errors related to starting the shell.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Command not found.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found.
        command: String,
    },

    /// Permission denied.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be executed.
        path: String,
    },

    /// PTY allocation failed.
    #[error("failed to allocate PTY: {reason}")]
    PtyAllocation {
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid command or argument.
    #[error("invalid {kind}: {reason}")]
    InvalidArgument {
        /// The kind of invalid input (e.g., "command", "argument").
        kind: String,
        /// The reason it's invalid.
        reason: String,
    },

    /// General I/O error during spawn.
    #[error("I/O error during spawn: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// Create a timeout error.
    pub fn timeout(
        duration: Duration,
        pattern: impl Into<String>,
        buffer: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            duration,
            pattern: pattern.into(),
            buffer: buffer.into(),
        }
    }

    /// Create an unexpected exit error.
    pub fn unexpected_exit(
        state: ProcessState,
        pattern: impl Into<String>,
        buffer: impl Into<String>,
    ) -> Self {
        Self::UnexpectedExit {
            state,
            pattern: pattern.into(),
            buffer: buffer.into(),
        }
    }

    /// Create a write error.
    pub fn write(reason: impl Into<String>) -> Self {
        Self::Write {
            reason: reason.into(),
        }
    }

    /// Create a resource error with context.
    pub fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the shell terminated while a pattern was pending.
    #[must_use]
    pub const fn is_unexpected_exit(&self) -> bool {
        matches!(self, Self::UnexpectedExit { .. })
    }

    /// Whether the error ends the test: nothing useful can follow it.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Spawn(_)
                | Self::Write { .. }
                | Self::Resource { .. }
                | Self::UnexpectedExit { .. }
                | Self::SessionClosed
        )
    }

    /// Get the buffered output if this error contains it.
    #[must_use]
    pub fn buffer(&self) -> Option<&str> {
        match self {
            Self::Timeout { buffer, .. } | Self::UnexpectedExit { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Get the pending pattern description if this error contains it.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        match self {
            Self::Timeout { pattern, .. } | Self::UnexpectedExit { pattern, .. } => Some(pattern),
            _ => None,
        }
    }
}

impl From<regex::Error> for HarnessError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPattern {
            message: err.to_string(),
        }
    }
}

impl SpawnError {
    /// Create a command not found error.
    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
        }
    }

    /// Create a PTY allocation error.
    pub fn pty_allocation(reason: impl Into<String>) -> Self {
        Self::PtyAllocation {
            reason: reason.into(),
        }
    }
}
