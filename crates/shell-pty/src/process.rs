//! The program running on the slave side: how to control it and how it
//! ended.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Shells report a job killed by signal `n` as exit code `128 + n`.
pub const SHELL_SIGNAL_BASE: i32 = 128;

/// Control over a spawned program.
///
/// Object safe, so callers can hold `Box<dyn PtyChild>` and substitute a
/// scripted child in tests.
pub trait PtyChild: Send + Sync {
    /// Process ID.
    fn pid(&self) -> u32;

    /// Resolve once the program has exited. Later calls return the same
    /// status.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitStatus>> + Send + '_>>;

    /// The exit status, or `None` while the program is running.
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;

    /// Deliver `signal`.
    ///
    /// Fails with [`PtyError::Exited`](crate::PtyError::Exited) once the
    /// program has been reaped, so a recycled pid is never hit.
    fn signal(&self, signal: PtySignal) -> Result<()>;

    /// Deliver SIGKILL.
    fn kill(&mut self) -> Result<()> {
        self.signal(PtySignal::Kill)
    }
}

/// How a program ended, as reported by `waitpid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited with this code.
    Exited(i32),
    /// Terminated by this signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Read exit codes of [`SHELL_SIGNAL_BASE`] and above as the signal they
    /// encode.
    ///
    /// ```
    /// use shell_pty::ExitStatus;
    ///
    /// assert_eq!(ExitStatus::Exited(139).normalized(), ExitStatus::Signaled(11));
    /// assert_eq!(ExitStatus::Exited(2).normalized(), ExitStatus::Exited(2));
    /// ```
    #[must_use]
    pub const fn normalized(self) -> Self {
        match self {
            Self::Exited(code) if code >= SHELL_SIGNAL_BASE => {
                Self::Signaled(code - SHELL_SIGNAL_BASE)
            }
            other => other,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

#[cfg(unix)]
impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            // Stopped or continued; wait(2) does not report these here.
            (None, None) => Self::Exited(-1),
        }
    }
}

/// Signals that can be sent to the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtySignal {
    /// SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGKILL.
    Kill,
    /// SIGHUP, as sent when a terminal closes.
    Hangup,
}

impl PtySignal {
    #[cfg(unix)]
    pub(crate) const fn number(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Hangup => libc::SIGHUP,
        }
    }
}
