//! shell-harness: Expect-style tests for interactive shells
//!
//! This crate runs a shell under a pseudo-terminal, sends it input and
//! waits, with a deadline, for expected text to appear in its output. It
//! notices when the shell exits or crashes instead of waiting out the
//! timeout, and turns the assertions a test makes into a pass/fail report.
//!
//! # Pieces
//!
//! - [`Session`]: the shell process, its terminal and a background reader
//! - [`OutputBuffer`]: everything the shell printed, with a consumed cursor
//! - [`ExpectationEngine`]: waits for a [`Pattern`] or for the shell to exit
//! - [`ProcessMonitor`]: liveness and termination of the child
//! - [`TestContext`]: one test, its assertions and its cleanups
//! - [`Harness`]: logging setup and the summary for a whole run
//!
//! # Example
//!
//! ```ignore
//! use shell_harness::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let config = HarnessConfig::new("./cush");
//!     let result = run_script("cd changes directory", &config, |ctx| {
//!         Box::pin(async move {
//!             let dir = ctx.temp_dir("-cd")?;
//!             ctx.send_line(&format!("cd {}", dir.display())).await?;
//!             ctx.expect_prompt(None).await?;
//!             ctx.send_line("pwd").await?;
//!             ctx.expect_exact(&dir.display().to_string(), Some("pwd prints new directory"))
//!                 .await?;
//!             Ok(())
//!         })
//!     })
//!     .await;
//!     (&result).into()
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod expect;
pub mod harness;
pub mod logging;
pub mod monitor;
pub mod prelude;
pub mod result;
pub mod session;
pub mod types;

pub use config::{
    HarnessConfig, LineEnding, LogFormat, LoggingConfig, ReportFormat, ShellConfig,
};
pub use context::{TestContext, run_script};
pub use error::{HarnessError, Result, SpawnError};
pub use expect::{
    CompiledRegex, Expectation, ExpectationEngine, OutputBuffer, Pattern, PromptPattern,
};
pub use futures::future::BoxFuture;
pub use harness::Harness;
pub use monitor::ProcessMonitor;
pub use result::{AssertionOutcome, OutcomeKind, TestResult, TestStatus};
pub use session::Session;
pub use shell_pty::{ExitStatus, PtySignal};
pub use types::{ContextState, ControlChar, Match, ProcessState, SessionState};
