//! The surface test scripts talk to.
//!
//! A [`TestContext`] owns one shell session, records the outcome of every
//! assertion, and tears everything down in [`finish`](TestContext::finish):
//! the shell is terminated, the terminal released, then cleanup callbacks
//! run newest first.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::expect::{Expectation, ExpectationEngine, OutputBuffer, Pattern};
use crate::result::{AssertionOutcome, OutcomeKind, TestResult};
use crate::session::Session;
use crate::types::{ContextState, ControlChar, Match, ProcessState};

type CleanupFn = Box<dyn FnOnce() -> std::io::Result<()> + Send>;

struct Cleanup {
    name: String,
    action: CleanupFn,
}

/// One running test: a shell session plus the assertions made against it.
pub struct TestContext {
    name: String,
    config: HarnessConfig,
    session: Session,
    engine: ExpectationEngine,
    result: TestResult,
    state: ContextState,
    cleanups: Vec<Cleanup>,
    started: Instant,
    last_recorded: Option<String>,
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("session", &self.session)
            .field("cleanups", &self.cleanups.len())
            .finish_non_exhaustive()
    }
}

impl TestContext {
    /// Spawn the shell and wait for its first prompt.
    ///
    /// On failure the shell is already stopped when the error is returned.
    pub async fn start(name: impl Into<String>, config: &HarnessConfig) -> Result<Self> {
        let name = name.into();
        config.validate()?;

        let started = Instant::now();
        tracing::info!(test = %name, shell = %config.shell.command_line(), "starting test");

        let session =
            Session::spawn_with(&config.shell, config.buffer_max_size, config.close_grace).await?;
        let engine = ExpectationEngine::new(
            session.buffer().clone(),
            config.prompt.clone(),
            config.poll_interval,
        );

        let mut ctx = Self {
            result: TestResult::new(name.clone()),
            name,
            config: config.clone(),
            session,
            engine,
            state: ContextState::Initializing,
            cleanups: Vec::new(),
            started,
            last_recorded: None,
        };

        let first_prompt = Expectation::new(Pattern::Prompt, config.startup_timeout)
            .with_description("shell prints its first prompt");
        let synced = ctx.engine.expect(&first_prompt, ctx.session.monitor_mut()).await;
        match synced {
            Ok(_) => {
                ctx.state = ContextState::Running;
                tracing::debug!(test = %ctx.name, "shell is ready");
                Ok(ctx)
            }
            Err(err) => {
                ctx.state = ContextState::Finalizing;
                if let Err(close_err) = ctx.session.close().await {
                    tracing::warn!(error = %close_err, "failed to stop shell after startup failure");
                }
                ctx.state = ContextState::Closed;
                Err(err)
            }
        }
    }

    /// Test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ContextState {
        self.state
    }

    /// The configuration the test runs with.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Outcomes recorded so far.
    #[must_use]
    pub const fn result(&self) -> &TestResult {
        &self.result
    }

    /// The shell's output buffer.
    #[must_use]
    pub const fn buffer(&self) -> &OutputBuffer {
        self.session.buffer()
    }

    /// The underlying session.
    pub const fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Send a line of input.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        self.ensure_running()?;
        let sent = self.session.send_line(text).await;
        match sent {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(OutcomeKind::Send, format!("send {text:?}"), err)),
        }
    }

    /// Send a control character.
    pub async fn send_control(&mut self, ctrl: ControlChar) -> Result<()> {
        self.ensure_running()?;
        let sent = self.session.send_control(ctrl).await;
        match sent {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(OutcomeKind::Send, format!("send {ctrl:?}"), err)),
        }
    }

    /// Wait for the prompt with the default timeout.
    pub async fn expect_prompt(&mut self, description: Option<&str>) -> Result<Match> {
        let timeout = self.config.default_timeout;
        self.expect_within(Pattern::Prompt, timeout, description).await
    }

    /// Wait for the prompt with an explicit timeout.
    pub async fn expect_prompt_within(
        &mut self,
        timeout: Duration,
        description: Option<&str>,
    ) -> Result<Match> {
        self.expect_within(Pattern::Prompt, timeout, description).await
    }

    /// Wait for exact text with the default timeout.
    pub async fn expect_exact(&mut self, text: &str, description: Option<&str>) -> Result<Match> {
        let timeout = self.config.default_timeout;
        self.expect_within(Pattern::literal(text), timeout, description)
            .await
    }

    /// Wait for exact text with an explicit timeout.
    pub async fn expect_exact_within(
        &mut self,
        text: &str,
        timeout: Duration,
        description: Option<&str>,
    ) -> Result<Match> {
        self.expect_within(Pattern::literal(text), timeout, description)
            .await
    }

    /// Wait for a regular expression with the default timeout.
    pub async fn expect_regex(&mut self, pattern: &str, description: Option<&str>) -> Result<Match> {
        let timeout = self.config.default_timeout;
        self.expect_regex_within(pattern, timeout, description).await
    }

    /// Wait for a regular expression with an explicit timeout.
    pub async fn expect_regex_within(
        &mut self,
        pattern: &str,
        timeout: Duration,
        description: Option<&str>,
    ) -> Result<Match> {
        match Pattern::regex(pattern) {
            Ok(pattern) => self.expect_within(pattern, timeout, description).await,
            Err(err) => {
                let description = description.map_or_else(|| format!("regex /{pattern}/"), str::to_string);
                Err(self.fail(OutcomeKind::Expectation, description, err))
            }
        }
    }

    /// Wait for any pattern with an explicit timeout.
    ///
    /// Without a description, the pattern itself names the assertion.
    pub async fn expect_within(
        &mut self,
        pattern: Pattern,
        timeout: Duration,
        description: Option<&str>,
    ) -> Result<Match> {
        self.ensure_running()?;
        let description =
            description.map_or_else(|| self.engine.describe(&pattern), str::to_string);
        let expectation = Expectation::new(pattern, timeout).with_description(description.clone());

        let outcome = self
            .engine
            .expect(&expectation, self.session.monitor_mut())
            .await;
        match outcome {
            Ok(found) => {
                self.result
                    .record(AssertionOutcome::pass(OutcomeKind::Expectation, description));
                Ok(found)
            }
            Err(err) => Err(self.fail(OutcomeKind::Expectation, description, err)),
        }
    }

    /// Wait, with the default timeout, for the shell to exit on its own.
    pub async fn expect_exit(&mut self, description: Option<&str>) -> Result<ProcessState> {
        let timeout = self.config.default_timeout;
        self.expect_exit_within(timeout, description).await
    }

    /// Wait for the shell to exit with an explicit timeout.
    pub async fn expect_exit_within(
        &mut self,
        timeout: Duration,
        description: Option<&str>,
    ) -> Result<ProcessState> {
        self.ensure_running()?;
        let description = description.unwrap_or("shell exits").to_string();
        let outcome = self
            .engine
            .expect_exit(timeout, self.session.monitor_mut())
            .await;
        match outcome {
            Ok(state) => {
                self.result
                    .record(AssertionOutcome::pass(OutcomeKind::Exit, description));
                Ok(state)
            }
            Err(err) => Err(self.fail(OutcomeKind::Exit, description, err)),
        }
    }

    /// Create a temporary directory that is removed when the test finishes.
    ///
    /// The returned path is canonical, so it matches what the shell prints.
    pub fn temp_dir(&mut self, suffix: &str) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("shell-harness-")
            .suffix(suffix)
            .tempdir()
            .map_err(|e| HarnessError::resource("failed to create temporary directory", e))?;
        let path = dir
            .path()
            .canonicalize()
            .map_err(|e| HarnessError::resource("failed to resolve temporary directory", e))?;

        tracing::debug!(path = %path.display(), "created fixture directory");
        self.on_cleanup(format!("remove {}", path.display()), move || dir.close());
        Ok(path)
    }

    /// Register a callback to run when the test finishes.
    ///
    /// Callbacks run in reverse registration order, after the shell has been
    /// stopped, whether the test passed, failed or panicked.
    pub fn on_cleanup<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> std::io::Result<()> + Send + 'static,
    {
        self.cleanups.push(Cleanup {
            name: name.into(),
            action: Box::new(action),
        });
    }

    /// Stop the shell, run cleanups, print the report and return the result.
    ///
    /// Calling it again returns the same result without doing anything.
    pub async fn finish(&mut self) -> TestResult {
        if self.state == ContextState::Closed {
            return self.result.clone();
        }
        self.state = ContextState::Finalizing;

        if let Err(err) = self.session.close().await {
            tracing::warn!(test = %self.name, error = %err, "failed to close session");
            self.result.cleanup_errors.push(format!("closing shell: {err}"));
        }
        self.run_cleanups();

        self.result.duration = self.started.elapsed();
        self.state = ContextState::Closed;

        if let Some(report) = self.result.render(self.config.report) {
            println!("{report}");
        }
        tracing::info!(
            test = %self.name,
            status = ?self.result.status,
            assertions = self.result.outcomes.len(),
            "test finished"
        );
        self.result.clone()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == ContextState::Running {
            Ok(())
        } else {
            Err(HarnessError::SessionClosed)
        }
    }

    fn fail(&mut self, kind: OutcomeKind, description: String, err: HarnessError) -> HarnessError {
        tracing::warn!(test = %self.name, %description, error = %err, "assertion failed");
        self.result
            .record(AssertionOutcome::fail(kind, description, &err));
        self.last_recorded = Some(err.to_string());
        if err.is_fatal() {
            self.state = ContextState::Finalizing;
        }
        err
    }

    fn already_reported(&self, err: &HarnessError) -> bool {
        let after_fatal =
            matches!(err, HarnessError::SessionClosed) && self.state != ContextState::Running;
        after_fatal || self.last_recorded.as_deref() == Some(err.to_string().as_str())
    }

    fn record_script_error(&mut self, err: HarnessError) {
        if self.already_reported(&err) {
            return;
        }
        let description = match err {
            HarnessError::ScriptPanicked { .. } => "test script panicked",
            _ => "test script failed",
        };
        let _ = self.fail(OutcomeKind::Script, description.to_string(), err);
    }

    fn run_cleanups(&mut self) {
        while let Some(Cleanup { name, action }) = self.cleanups.pop() {
            tracing::debug!(cleanup = %name, "running cleanup");
            let problem = match std::panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{name}: {e}"),
                Err(panic) => format!("{name}: panicked: {}", panic_message(&*panic)),
            };
            tracing::warn!(test = %self.name, problem = %problem, "cleanup failed");
            self.result.cleanup_errors.push(problem);
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        tracing::warn!(test = %self.name, "test context dropped without finish, cleaning up");
        self.session.monitor_mut().kill_now();
        self.run_cleanups();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Run one test script from start to finish.
///
/// The shell is started, `script` runs against the context, and
/// [`TestContext::finish`] always runs afterwards, including when the script
/// returns an error or panics. A failed startup is reported as a failed test.
///
/// ```ignore
/// let result = run_script("cd", &config, |ctx| {
///     Box::pin(async move {
///         ctx.send_line("cd /tmp").await?;
///         ctx.expect_prompt(None).await?;
///         Ok(())
///     })
/// })
/// .await;
/// ```
pub async fn run_script<F>(name: &str, config: &HarnessConfig, script: F) -> TestResult
where
    F: for<'a> FnOnce(&'a mut TestContext) -> BoxFuture<'a, Result<()>>,
{
    let started = Instant::now();
    let mut ctx = match TestContext::start(name, config).await {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::warn!(test = %name, error = %err, "test could not start");
            let mut result = TestResult::new(name);
            result.record(AssertionOutcome::fail(
                OutcomeKind::Startup,
                "shell starts and prints its first prompt",
                &err,
            ));
            result.duration = started.elapsed();
            if let Some(report) = result.render(config.report) {
                println!("{report}");
            }
            return result;
        }
    };

    // The closure itself runs inside the guard so a panic while building the
    // future still reaches `finish`.
    let outcome = AssertUnwindSafe(async { script(&mut ctx).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => ctx.record_script_error(err),
        Err(panic) => ctx.record_script_error(HarnessError::ScriptPanicked {
            message: panic_message(&*panic),
        }),
    }

    ctx.finish().await
}
