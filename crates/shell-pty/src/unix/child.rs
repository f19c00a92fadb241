//! The child process, started with the slave as its controlling terminal.

use std::future::Future;
use std::io;
use std::os::unix::io::OwnedFd;
use std::pin::Pin;
use std::process::Stdio;

use rustix::process::{Pid, Signal, kill_process};
use tokio::process::{Child, Command};

use crate::command::PtyCommand;
use crate::error::{PtyError, Result, os_error};
use crate::process::{ExitStatus, PtyChild, PtySignal};

/// A program running on the slave side.
///
/// The exit status is cached on first observation; after that every signal
/// request fails with [`PtyError::Exited`].
#[derive(Debug)]
pub struct UnixPtyChild {
    child: Child,
    pid: u32,
    status: Option<ExitStatus>,
}

impl UnixPtyChild {
    fn reaped(&mut self, status: std::process::ExitStatus) -> ExitStatus {
        let status = ExitStatus::from(status);
        self.status = Some(status);
        status
    }

    fn raw_pid(&self) -> Result<Pid> {
        i32::try_from(self.pid)
            .ok()
            .and_then(Pid::from_raw)
            .ok_or_else(|| {
                PtyError::Signal(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("pid {} out of range", self.pid),
                ))
            })
    }
}

impl PtyChild for UnixPtyChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitStatus>> + Send + '_>> {
        Box::pin(async move {
            if let Some(status) = self.status {
                return Ok(status);
            }
            let status = self.child.wait().await.map_err(PtyError::Wait)?;
            Ok(self.reaped(status))
        })
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        let polled = self.child.try_wait().map_err(PtyError::Wait)?;
        Ok(polled.map(|status| self.reaped(status)))
    }

    fn signal(&self, signal: PtySignal) -> Result<()> {
        if let Some(status) = self.status {
            return Err(PtyError::Exited(status));
        }
        let pid = self.raw_pid()?;
        let signal = Signal::from_named_raw(signal.number()).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "unknown signal"))
        })?;
        kill_process(pid, signal).map_err(|e| PtyError::Signal(os_error(e)))
    }
}

/// Start `command` with `slave` as stdin, stdout, stderr and controlling
/// terminal. Consumes `slave`; the parent's copy is closed on return.
pub(crate) fn spawn_child(slave: OwnedFd, command: &PtyCommand) -> Result<UnixPtyChild> {
    let stdio = || -> Result<Stdio> {
        let fd = rustix::io::dup(&slave).map_err(|e| PtyError::Spawn(os_error(e)))?;
        Ok(Stdio::from(fd))
    };

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env_clear()
        .envs(command.environment())
        .stdin(stdio()?)
        .stdout(stdio()?)
        .stderr(stdio()?)
        .kill_on_drop(true);
    if let Some(dir) = &command.current_dir {
        cmd.current_dir(dir);
    }

    // SAFETY: only async-signal-safe calls run between fork and exec. Stdio
    // is installed before this hook, so descriptor 0 is the slave.
    #[allow(unsafe_code)]
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    drop(cmd);
    drop(slave);

    let pid = child.id().ok_or_else(|| {
        PtyError::Spawn(io::Error::other("child was reaped before its pid was read"))
    })?;
    Ok(UnixPtyChild {
        child,
        pid,
        status: None,
    })
}
