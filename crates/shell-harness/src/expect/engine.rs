//! Bounded waits for patterns in the shell's output.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::buffer::OutputBuffer;
use super::pattern::{Pattern, PromptPattern};
use crate::error::{HarnessError, Result};
use crate::monitor::ProcessMonitor;
use crate::types::{Match, ProcessState};

/// Default interval between liveness checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output may keep trickling in after the shell has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// A single bounded-time assertion.
#[derive(Debug, Clone)]
pub struct Expectation {
    /// What to wait for.
    pub pattern: Pattern,
    /// How long to wait.
    pub timeout: Duration,
    /// Message used when the expectation fails.
    pub description: Option<String>,
}

impl Expectation {
    /// Create an expectation without a description.
    #[must_use]
    pub const fn new(pattern: Pattern, timeout: Duration) -> Self {
        Self {
            pattern,
            timeout,
            description: None,
        }
    }

    /// Attach a failure description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Deadline bookkeeping for one wait.
#[derive(Debug, Clone, Copy)]
struct WaitState {
    timeout: Duration,
    deadline: Instant,
}

impl WaitState {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    fn is_timed_out(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Matches patterns against an [`OutputBuffer`] while watching the shell.
///
/// The engine is the only consumer of its buffer: every successful match
/// advances the consumed offset, so later expectations only see output
/// produced after the previous match.
#[derive(Debug)]
pub struct ExpectationEngine {
    buffer: OutputBuffer,
    changes: watch::Receiver<usize>,
    prompt: PromptPattern,
    poll_interval: Duration,
}

impl ExpectationEngine {
    /// Create an engine over `buffer`, resolving prompts with `prompt`.
    #[must_use]
    pub fn new(buffer: OutputBuffer, prompt: PromptPattern, poll_interval: Duration) -> Self {
        let changes = buffer.subscribe();
        Self {
            buffer,
            changes,
            prompt,
            poll_interval,
        }
    }

    /// The prompt pattern in use.
    #[must_use]
    pub const fn prompt(&self) -> &PromptPattern {
        &self.prompt
    }

    /// The buffer being matched.
    #[must_use]
    pub const fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// Describe a pattern the way failure messages do.
    #[must_use]
    pub fn describe(&self, pattern: &Pattern) -> String {
        pattern.describe(&self.prompt)
    }

    /// Wait for `expectation` to match.
    ///
    /// Fails with [`HarnessError::Timeout`] once the timeout elapses, or with
    /// [`HarnessError::UnexpectedExit`] as soon as the shell is seen to have
    /// terminated without the pattern appearing in its final output.
    pub async fn expect(
        &mut self,
        expectation: &Expectation,
        monitor: &mut ProcessMonitor,
    ) -> Result<Match> {
        let wait = WaitState::new(expectation.timeout);
        let mut drained = false;

        loop {
            self.changes.mark_unchanged();

            if let Some(found) = self.try_match(&expectation.pattern) {
                tracing::debug!(offset = found.offset, matched = %found.matched.escape_debug(), "pattern matched");
                return Ok(found);
            }

            if drained {
                return Err(HarnessError::unexpected_exit(
                    monitor.state(),
                    self.describe(&expectation.pattern),
                    self.buffer.unconsumed_lossy(),
                ));
            }

            if !monitor.refresh().is_alive() {
                self.drain().await;
                drained = true;
                continue;
            }

            if wait.is_timed_out() {
                return Err(HarnessError::timeout(
                    wait.timeout,
                    self.describe(&expectation.pattern),
                    self.buffer.unconsumed_lossy(),
                ));
            }

            self.wait_for_change(wait.deadline).await;
        }
    }

    /// Wait for the shell to terminate and report how it ended.
    pub async fn expect_exit(
        &mut self,
        timeout: Duration,
        monitor: &mut ProcessMonitor,
    ) -> Result<ProcessState> {
        let wait = WaitState::new(timeout);
        match monitor.wait_timeout(wait.remaining()).await? {
            Some(state) => {
                self.drain().await;
                Ok(state)
            }
            None => Err(HarnessError::timeout(
                timeout,
                "shell to exit",
                self.buffer.unconsumed_lossy(),
            )),
        }
    }

    fn try_match(&self, pattern: &Pattern) -> Option<Match> {
        self.buffer
            .consume_match(|unconsumed| pattern.find(unconsumed, &self.prompt))
    }

    async fn wait_for_change(&mut self, deadline: Instant) {
        let wake = (Instant::now() + self.poll_interval).min(deadline);
        let _ = tokio::time::timeout_at(wake, self.changes.changed()).await;
    }

    /// Let the reader pick up whatever the shell wrote before exiting.
    async fn drain(&mut self) {
        let deadline = Instant::now() + EXIT_DRAIN_GRACE;
        while !self.buffer.is_closed() {
            match tokio::time::timeout_at(deadline, self.changes.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::fake::{Exit, FakeChild};
    use shell_pty::ExitStatus;

    fn setup() -> (ExpectationEngine, ProcessMonitor, OutputBuffer, Exit) {
        let buffer = OutputBuffer::default();
        let engine = ExpectationEngine::new(
            buffer.clone(),
            PromptPattern::default(),
            Duration::from_millis(10),
        );
        let child = FakeChild::new();
        let exit = child.exit.clone();
        (engine, ProcessMonitor::new(Box::new(child)), buffer, exit)
    }

    fn prompt(timeout_ms: u64) -> Expectation {
        Expectation::new(Pattern::Prompt, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn matches_buffered_output() {
        let (mut engine, mut monitor, buffer, _exit) = setup();
        buffer.append(b"/tmp/x\r\ncush> ");

        let m = engine
            .expect(&Expectation::new("/tmp/x".into(), Duration::from_secs(1)), &mut monitor)
            .await
            .unwrap();
        assert_eq!(m.matched, "/tmp/x");
        assert_eq!(m.offset, 0);
    }

    #[tokio::test]
    async fn wakes_on_late_output() {
        let (mut engine, mut monitor, buffer, _exit) = setup();
        let writer = buffer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.append(b"cu");
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append(b"sh> ");
        });

        let m = engine.expect(&prompt(2000), &mut monitor).await.unwrap();
        assert_eq!(m.matched, "cush> ");
    }

    #[tokio::test]
    async fn prompts_are_matched_once_each_in_order() {
        let (mut engine, mut monitor, buffer, _exit) = setup();
        buffer.append(b"a\r\ncush> b\r\ncush> ");

        let first = engine.expect(&prompt(100), &mut monitor).await.unwrap();
        let second = engine.expect(&prompt(100), &mut monitor).await.unwrap();
        assert_eq!(first.before, "a\r\n");
        assert_eq!(second.before, "b\r\n");
        assert!(second.offset > first.offset);

        let third = engine.expect(&prompt(100), &mut monitor).await;
        assert!(third.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn timeout_is_not_early_or_late() {
        let (mut engine, mut monitor, buffer, _exit) = setup();
        buffer.append(b"something else");

        let start = std::time::Instant::now();
        let err = engine
            .expect(&Expectation::new("never".into(), Duration::from_millis(300)), &mut monitor)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");
        assert_eq!(err.buffer(), Some("something else"));
        assert_eq!(buffer.consumed_offset(), 0);
    }

    #[tokio::test]
    async fn crash_is_not_reported_as_timeout() {
        let (mut engine, mut monitor, _buffer, exit) = setup();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            exit.set(ExitStatus::Signaled(libc::SIGSEGV));
        });

        let start = std::time::Instant::now();
        let err = engine.expect(&prompt(5000), &mut monitor).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        match err {
            HarnessError::UnexpectedExit { state, .. } => {
                assert_eq!(state, ProcessState::Crashed { signal: libc::SIGSEGV });
            }
            other => panic!("expected unexpected exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_early_exit_is_distinct_from_crash() {
        let (mut engine, mut monitor, buffer, exit) = setup();
        exit.set(ExitStatus::Exited(0));
        buffer.close();

        let err = engine.expect(&prompt(1000), &mut monitor).await.unwrap_err();
        match err {
            HarnessError::UnexpectedExit { state, .. } => assert!(!state.is_crash()),
            other => panic!("expected unexpected exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn final_output_after_exit_still_matches() {
        let (mut engine, mut monitor, buffer, exit) = setup();
        exit.set(ExitStatus::Exited(0));
        let writer = buffer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.append(b"goodbye\r\n");
            writer.close();
        });

        let m = engine
            .expect(&Expectation::new("goodbye".into(), Duration::from_secs(1)), &mut monitor)
            .await
            .unwrap();
        assert_eq!(m.matched, "goodbye");
    }

    #[tokio::test]
    async fn expect_exit_reports_state() {
        let (mut engine, mut monitor, buffer, exit) = setup();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            exit.set(ExitStatus::Exited(4));
        });
        buffer.close();

        let state = engine
            .expect_exit(Duration::from_secs(1), &mut monitor)
            .await
            .unwrap();
        assert_eq!(state, ProcessState::Exited { code: 4 });
    }

    #[tokio::test]
    async fn expect_exit_times_out_while_running() {
        let (mut engine, mut monitor, _buffer, _exit) = setup();
        let err = engine
            .expect_exit(Duration::from_millis(100), &mut monitor)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
