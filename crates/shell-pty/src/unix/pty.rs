//! The master side of the terminal.
//!
//! The master descriptor is registered with tokio once and shared between a
//! read half and a write half, so the background reader and a foreground
//! writer never wait on each other.

use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use rustix::fs::{Mode, OFlags, fcntl_setfl, open};
use rustix::io::Errno;
use rustix::pty::{OpenptFlags, grantpt, openpt, ptsname, unlockpt};
use rustix::termios::{Winsize, tcsetwinsize};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{PtyError, Result, os_error};

type SharedFd = Arc<AsyncFd<OwnedFd>>;

/// Master side of a terminal pair, as returned by
/// [`PtyCommand::spawn`](crate::PtyCommand::spawn).
pub struct UnixPtyMaster {
    fd: SharedFd,
}

impl std::fmt::Debug for UnixPtyMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyMaster")
            .field("fd", &self.fd.as_raw_fd())
            .finish()
    }
}

impl UnixPtyMaster {
    /// Allocate a pair; returns the master and the slave's device path.
    pub(crate) fn open() -> Result<(Self, String)> {
        let fail = |e: Errno| PtyError::Open(os_error(e));

        let fd = openpt(OpenptFlags::RDWR | OpenptFlags::NOCTTY).map_err(fail)?;
        grantpt(&fd).map_err(fail)?;
        unlockpt(&fd).map_err(fail)?;
        let slave = ptsname(&fd, Vec::new()).map_err(fail)?;
        let slave = slave.into_string().map_err(|_| {
            PtyError::Open(io::Error::new(
                io::ErrorKind::InvalidData,
                "slave device path is not UTF-8",
            ))
        })?;

        fcntl_setfl(&fd, OFlags::NONBLOCK).map_err(fail)?;
        let fd = AsyncFd::new(fd).map_err(PtyError::Open)?;
        Ok((Self { fd: Arc::new(fd) }, slave))
    }

    pub(crate) fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let size = Winsize {
            ws_col: cols,
            ws_row: rows,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        tcsetwinsize(self.fd.get_ref(), size).map_err(|e| PtyError::Open(os_error(e)))
    }

    /// Split into halves for concurrent reading and writing.
    ///
    /// The descriptor closes when both halves are dropped.
    #[must_use]
    pub fn into_split(self) -> (PtyReader, PtyWriter) {
        let reader = PtyReader {
            fd: Arc::clone(&self.fd),
        };
        let writer = PtyWriter {
            fd: self.fd,
            shut_down: false,
        };
        (reader, writer)
    }
}

/// Read half of the master.
///
/// Once every slave descriptor is closed Linux fails master reads with
/// `EIO`; this half reports that as end-of-stream.
#[derive(Debug)]
pub struct PtyReader {
    fd: SharedFd,
}

impl AsyncRead for PtyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            match rustix::io::read(self.fd.get_ref(), buf.initialize_unfilled()) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(Errno::AGAIN) => guard.clear_ready(),
                Err(Errno::IO) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(os_error(e))),
            }
        }
    }
}

/// Write half of the master.
#[derive(Debug)]
pub struct PtyWriter {
    fd: SharedFd,
    shut_down: bool,
}

fn closed(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, what)
}

impl AsyncWrite for PtyWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.shut_down {
            return Poll::Ready(Err(closed("pty writer shut down")));
        }
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match rustix::io::write(self.fd.get_ref(), buf) {
                Ok(n) => return Poll::Ready(Ok(n)),
                Err(Errno::AGAIN) => guard.clear_ready(),
                Err(Errno::IO) => return Poll::Ready(Err(closed("pty slave closed"))),
                Err(e) => return Poll::Ready(Err(os_error(e))),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shut_down = true;
        Poll::Ready(Ok(()))
    }
}

/// Open the slave device without making it the caller's controlling
/// terminal.
pub(crate) fn open_slave(path: &str) -> Result<OwnedFd> {
    open(Path::new(path), OFlags::RDWR | OFlags::NOCTTY, Mode::empty())
        .map_err(|e| PtyError::Open(os_error(e)))
}
