//! Common types shared by the session, engine and test context.

use std::fmt;

use serde::Serialize;
use shell_pty::ExitStatus;

/// Snapshot of the child's liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    /// The child has not been observed to exit.
    Running,

    /// The child exited with a regular exit code.
    Exited {
        /// The exit code.
        code: i32,
    },

    /// The child was killed by a signal or exited with a code of 128 or more.
    Crashed {
        /// The terminating signal.
        signal: i32,
    },
}

impl ProcessState {
    /// Classify an exit status reported by the PTY layer.
    ///
    /// Exit codes of [`SHELL_SIGNAL_BASE`](shell_pty::SHELL_SIGNAL_BASE) and
    /// above count as crashes.
    #[must_use]
    pub const fn from_exit_status(status: ExitStatus) -> Self {
        match status.normalized() {
            ExitStatus::Signaled(signal) => Self::Crashed { signal },
            ExitStatus::Exited(code) => Self::Exited { code },
        }
    }

    /// Whether the child is still running.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the child terminated abnormally.
    #[must_use]
    pub const fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed { .. })
    }

    /// The exit code, if the child exited normally.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

impl From<ExitStatus> for ProcessState {
    fn from(status: ExitStatus) -> Self {
        Self::from_exit_status(status)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited { code } => write!(f, "exit code {code}"),
            Self::Crashed { signal } => write!(f, "signal {signal}"),
        }
    }
}

/// Lifecycle of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The child is being started.
    Spawning,
    /// The child is running.
    Running,
    /// The child exited with a regular exit code.
    Exited(i32),
    /// The child terminated abnormally.
    Crashed(i32),
    /// The session has been closed.
    Closed,
}

impl SessionState {
    /// Whether input can still be delivered.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<ProcessState> for SessionState {
    fn from(state: ProcessState) -> Self {
        match state {
            ProcessState::Running => Self::Running,
            ProcessState::Exited { code } => Self::Exited(code),
            ProcessState::Crashed { signal } => Self::Crashed(signal),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawning => write!(f, "spawning"),
            Self::Running => write!(f, "running"),
            Self::Exited(code) => write!(f, "exited ({code})"),
            Self::Crashed(signal) => write!(f, "crashed (signal {signal})"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Lifecycle of a [`TestContext`](crate::TestContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Spawning the shell and waiting for the first prompt.
    Initializing,
    /// The script is running.
    Running,
    /// Cleanup is in progress.
    Finalizing,
    /// All cleanup has run.
    Closed,
}

/// A successful expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// The text that matched.
    pub matched: String,

    /// Unconsumed text preceding the match.
    pub before: String,

    /// Absolute offset of the first matched byte in the session output.
    pub offset: usize,
}

impl Match {
    /// Get the matched text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.matched
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.matched)
    }
}

/// Control characters a test may send to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlChar {
    /// Ctrl+C (ETX) - Interrupt
    CtrlC,
    /// Ctrl+D (EOT) - End of transmission / EOF
    CtrlD,
    /// Ctrl+L (FF) - Clear screen
    CtrlL,
    /// Ctrl+U (NAK) - Kill line
    CtrlU,
    /// Ctrl+W (ETB) - Kill word
    CtrlW,
    /// Ctrl+Z (SUB) - Suspend
    CtrlZ,
    /// Ctrl+\ (FS) - Quit
    CtrlBackslash,
}

impl ControlChar {
    /// Get the byte value of this control character.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::CtrlC => 0x03,
            Self::CtrlD => 0x04,
            Self::CtrlL => 0x0C,
            Self::CtrlU => 0x15,
            Self::CtrlW => 0x17,
            Self::CtrlZ => 0x1A,
            Self::CtrlBackslash => 0x1C,
        }
    }

    /// Create a control character from the key pressed with Ctrl.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'c' => Some(Self::CtrlC),
            'd' => Some(Self::CtrlD),
            'l' => Some(Self::CtrlL),
            'u' => Some(Self::CtrlU),
            'w' => Some(Self::CtrlW),
            'z' => Some(Self::CtrlZ),
            '\\' => Some(Self::CtrlBackslash),
            _ => None,
        }
    }
}
