//! Failures reported by `shell-pty`.

use std::io;

use crate::process::ExitStatus;

/// Errors from allocating a terminal, starting a program on it, or
/// controlling that program afterwards.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// The terminal pair could not be allocated or sized.
    #[error("cannot allocate pseudo-terminal: {0}")]
    Open(#[source] io::Error),

    /// The program could not be started on the terminal.
    #[error("cannot start program: {0}")]
    Spawn(#[source] io::Error),

    /// A signal could not be delivered.
    #[error("cannot deliver signal: {0}")]
    Signal(#[source] io::Error),

    /// The exit status could not be collected.
    #[error("cannot collect exit status: {0}")]
    Wait(#[source] io::Error),

    /// The process has already been reaped.
    #[error("process already {0}")]
    Exited(ExitStatus),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, PtyError>;

#[cfg(unix)]
pub(crate) fn os_error(errno: rustix::io::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno.raw_os_error())
}
