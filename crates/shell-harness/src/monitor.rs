//! Liveness tracking for the shell process.

use std::time::Duration;

use shell_pty::{PtyChild, PtyError, PtySignal};

use crate::error::{HarnessError, Result};
use crate::types::ProcessState;

/// Observes whether the shell is still running and how it terminated.
pub struct ProcessMonitor {
    child: Box<dyn PtyChild>,
    state: ProcessState,
}

impl std::fmt::Debug for ProcessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMonitor")
            .field("pid", &self.child.pid())
            .field("state", &self.state)
            .finish()
    }
}

impl ProcessMonitor {
    /// Monitor a freshly spawned child.
    #[must_use]
    pub fn new(child: Box<dyn PtyChild>) -> Self {
        Self {
            child,
            state: ProcessState::Running,
        }
    }

    /// Process ID of the child.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    /// Latest known state, without checking the process.
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the child was running at the last refresh.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Check the child without blocking and update the state.
    pub fn refresh(&mut self) -> ProcessState {
        if !self.state.is_alive() {
            return self.state;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => self.record(status.into()),
            Ok(None) => {}
            Err(e) => tracing::warn!(pid = self.pid(), error = %e, "failed to poll shell status"),
        }
        self.state
    }

    fn record(&mut self, state: ProcessState) {
        if self.state != state {
            tracing::info!(pid = self.child.pid(), %state, "shell terminated");
        }
        self.state = state;
    }

    /// Send a signal to the child.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        match self.child.signal(signal) {
            Ok(()) | Err(PtyError::Exited(_)) => Ok(()),
            Err(e) => Err(pty_to_harness("failed to signal shell", e)),
        }
    }

    /// Wait up to `timeout` for the child to exit.
    ///
    /// Returns `None` if it is still running afterwards.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ProcessState>> {
        if !self.refresh().is_alive() {
            return Ok(Some(self.state));
        }
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.record(status.into());
                Ok(Some(self.state))
            }
            Ok(Err(e)) => Err(pty_to_harness("failed to wait for shell", e)),
            Err(_) => Ok(None),
        }
    }

    /// Stop the child: SIGHUP, then SIGKILL once `grace` has passed.
    ///
    /// Returns the final state. A child that already exited is left alone.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ProcessState> {
        if !self.refresh().is_alive() {
            return Ok(self.state);
        }

        tracing::debug!(pid = self.pid(), "sending SIGHUP to shell");
        self.signal(PtySignal::Hangup)?;
        if let Some(state) = self.wait_timeout(grace).await? {
            return Ok(state);
        }

        tracing::debug!(pid = self.pid(), "shell ignored SIGHUP, killing");
        match self.child.kill() {
            Ok(()) | Err(PtyError::Exited(_)) => {}
            Err(e) => return Err(pty_to_harness("failed to kill shell", e)),
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| pty_to_harness("failed to reap shell", e))?;
        self.record(status.into());
        Ok(self.state)
    }

    /// Best-effort SIGKILL without waiting, for drop paths.
    pub(crate) fn kill_now(&mut self) {
        if self.refresh().is_alive() {
            if let Err(e) = self.child.kill() {
                tracing::debug!(error = %e, "kill on drop failed");
            }
        }
    }
}

fn pty_to_harness(context: &str, err: PtyError) -> HarnessError {
    match err {
        PtyError::Signal(source)
        | PtyError::Wait(source)
        | PtyError::Open(source)
        | PtyError::Spawn(source) => HarnessError::resource(context, source),
        exited @ PtyError::Exited(_) => {
            HarnessError::resource(context, std::io::Error::other(exited.to_string()))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeChild;
    use super::*;
    use shell_pty::ExitStatus;

    #[test]
    fn refresh_tracks_exit() {
        let child = FakeChild::new();
        let exit = child.exit.clone();
        let mut monitor = ProcessMonitor::new(Box::new(child));

        assert_eq!(monitor.refresh(), ProcessState::Running);
        exit.set(ExitStatus::Exited(3));
        assert_eq!(monitor.refresh(), ProcessState::Exited { code: 3 });
        assert!(!monitor.is_alive());
    }

    #[test]
    fn abnormal_exit_is_a_crash() {
        let child = FakeChild::new();
        let exit = child.exit.clone();
        let mut monitor = ProcessMonitor::new(Box::new(child));

        exit.set(ExitStatus::Exited(134));
        assert_eq!(monitor.refresh(), ProcessState::Crashed { signal: 6 });
    }

    #[tokio::test]
    async fn terminate_stops_at_hangup_when_honoured() {
        let child = FakeChild::new();
        let signals = child.signals.clone();
        let mut monitor = ProcessMonitor::new(Box::new(child));

        let state = monitor.terminate(Duration::from_millis(200)).await.unwrap();
        assert_eq!(state, ProcessState::Crashed { signal: libc::SIGHUP });
        assert_eq!(*signals.lock().unwrap(), vec![PtySignal::Hangup]);
    }

    #[tokio::test]
    async fn terminate_escalates_to_kill() {
        let mut child = FakeChild::new();
        child.on_hangup = None;
        let signals = child.signals.clone();
        let mut monitor = ProcessMonitor::new(Box::new(child));

        let state = monitor.terminate(Duration::from_millis(50)).await.unwrap();
        assert_eq!(state, ProcessState::Crashed { signal: libc::SIGKILL });
        assert_eq!(
            *signals.lock().unwrap(),
            vec![PtySignal::Hangup, PtySignal::Kill]
        );
    }

    #[tokio::test]
    async fn terminate_leaves_exited_child_alone() {
        let child = FakeChild::new();
        child.exit.set(ExitStatus::Exited(0));
        let signals = child.signals.clone();
        let mut monitor = ProcessMonitor::new(Box::new(child));

        let state = monitor.terminate(Duration::from_millis(50)).await.unwrap();
        assert_eq!(state, ProcessState::Exited { code: 0 });
        assert!(signals.lock().unwrap().is_empty());
    }
}
