//! A running shell attached to a pseudo-terminal.
//!
//! A [`Session`] owns the child process, the write half of the terminal and
//! the background task that drains the read half into an [`OutputBuffer`].

use std::path::Path;
use std::time::Duration;

use shell_pty::{PtyError, PtySignal, PtyWriter};
use tokio::io::AsyncWriteExt;

use crate::config::{DEFAULT_CLOSE_GRACE, LineEnding, ShellConfig};
use crate::error::{HarnessError, Result, SpawnError};
use crate::expect::{DEFAULT_MAX_SIZE, OutputBuffer, ReaderTask};
use crate::monitor::ProcessMonitor;
use crate::types::{ControlChar, ProcessState, SessionState};

/// How long `close` waits for the reader task to wind down.
const READER_STOP_WAIT: Duration = Duration::from_secs(1);

/// A shell process and its terminal.
#[derive(Debug)]
pub struct Session {
    command: String,
    writer: Option<PtyWriter>,
    reader: Option<ReaderTask>,
    monitor: ProcessMonitor,
    buffer: OutputBuffer,
    line_ending: LineEnding,
    close_grace: Duration,
    closed: bool,
}

impl Session {
    /// Spawn the shell with default buffer size and close grace period.
    pub async fn spawn(config: &ShellConfig) -> Result<Self> {
        Self::spawn_with(config, DEFAULT_MAX_SIZE, DEFAULT_CLOSE_GRACE).await
    }

    /// Spawn the shell.
    ///
    /// `buffer_max_size` bounds retained output (see [`OutputBuffer::new`]);
    /// `close_grace` is the time between SIGHUP and SIGKILL in [`close`](Self::close).
    // Async so callers are inside the runtime the reader task needs.
    #[allow(clippy::unused_async)]
    pub async fn spawn_with(
        config: &ShellConfig,
        buffer_max_size: usize,
        close_grace: Duration,
    ) -> Result<Self> {
        let command = config.command_line();
        tracing::debug!(command = %command, state = %SessionState::Spawning, "spawning shell");

        check_spawn_args(config)?;

        let (master, child) = config
            .pty_command()
            .spawn()
            .map_err(|e| spawn_error(&config.path, e))?;

        let (reader, writer) = master.into_split();
        let buffer = OutputBuffer::new(buffer_max_size);
        let reader = ReaderTask::spawn(reader, buffer.clone());
        let monitor = ProcessMonitor::new(Box::new(child));

        tracing::info!(command = %command, pid = monitor.pid(), "shell started");

        Ok(Self {
            command,
            writer: Some(writer),
            reader: Some(reader),
            monitor,
            buffer,
            line_ending: config.line_ending,
            close_grace,
            closed: false,
        })
    }

    /// The command line the shell was started with.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Process ID of the shell.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.monitor.pid()
    }

    /// Current lifecycle state, refreshing the child's status.
    pub fn state(&mut self) -> SessionState {
        if self.closed {
            return SessionState::Closed;
        }
        self.monitor.refresh().into()
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// The buffer the reader task appends to.
    #[must_use]
    pub const fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// The liveness monitor for the shell.
    pub const fn monitor_mut(&mut self) -> &mut ProcessMonitor {
        &mut self.monitor
    }

    /// Write raw bytes to the shell.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(HarnessError::write("session is closed"));
        }
        let state = self.monitor.refresh();
        if !state.is_alive() {
            return Err(HarnessError::write(format!("shell has exited ({state})")));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| HarnessError::write("terminal is closed"))?;

        writer
            .write_all(data)
            .await
            .map_err(|e| HarnessError::write(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| HarnessError::write(e.to_string()))?;

        tracing::debug!(bytes = data.len(), "sent input");
        Ok(())
    }

    /// Write `text` followed by the configured line ending.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let mut line = Vec::with_capacity(text.len() + 2);
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(self.line_ending.as_bytes());
        tracing::debug!(line = %text.escape_debug(), "send_line");
        self.send(&line).await
    }

    /// Send a control character such as Ctrl-C.
    pub async fn send_control(&mut self, ctrl: ControlChar) -> Result<()> {
        self.send(&[ctrl.as_byte()]).await
    }

    /// Send a signal to the shell process.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        if self.closed {
            return Err(HarnessError::SessionClosed);
        }
        self.monitor.signal(signal)
    }

    /// Terminate the shell and release the terminal.
    ///
    /// The shell gets SIGHUP, then SIGKILL if it is still running after the
    /// grace period. Calling `close` again does nothing.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let terminated = self.monitor.terminate(self.close_grace).await;

        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.stop(READER_STOP_WAIT).await;
        }

        match &terminated {
            Ok(state) => tracing::info!(command = %self.command, %state, "session closed"),
            Err(e) => tracing::warn!(command = %self.command, error = %e, "session closed uncleanly"),
        }
        terminated.map(|_: ProcessState| ())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!(command = %self.command, "session dropped without close, killing shell");
        self.monitor.kill_now();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

fn check_spawn_args(config: &ShellConfig) -> Result<()> {
    let invalid = |kind: &str, reason: String| {
        HarnessError::Spawn(SpawnError::InvalidArgument {
            kind: kind.to_string(),
            reason,
        })
    };

    let path = config.path.to_string_lossy();
    if path.contains('\0') {
        return Err(invalid("command", format!("{path:?} contains a NUL byte")));
    }
    if let Some(arg) = config.args.iter().find(|a| a.contains('\0')) {
        return Err(invalid("argument", format!("{arg:?} contains a NUL byte")));
    }
    if let Some(dir) = &config.working_dir {
        if !dir.is_dir() {
            return Err(invalid(
                "working directory",
                format!("{} is not a directory", dir.display()),
            ));
        }
    }
    Ok(())
}

fn spawn_error(path: &Path, err: PtyError) -> HarnessError {
    let spawn = match err {
        PtyError::Spawn(e) => match e.kind() {
            std::io::ErrorKind::NotFound => SpawnError::command_not_found(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied {
                path: path.display().to_string(),
            },
            _ => SpawnError::Io(e),
        },
        PtyError::Open(e) => SpawnError::pty_allocation(e.to_string()),
        other => SpawnError::Io(std::io::Error::other(other.to_string())),
    };
    HarnessError::Spawn(spawn)
}
