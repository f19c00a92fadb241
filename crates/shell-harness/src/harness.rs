//! Process-wide setup and teardown for a test binary.
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let mut harness = match Harness::from_env() {
//!         Ok(h) => h,
//!         Err(e) => {
//!             eprintln!("{e}");
//!             return std::process::ExitCode::FAILURE;
//!         }
//!     };
//!     harness
//!         .run("pwd", |ctx| Box::pin(async move {
//!             ctx.send_line("pwd").await?;
//!             ctx.expect_prompt(None).await?;
//!             Ok(())
//!         }))
//!         .await;
//!     harness.teardown()
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use futures::future::BoxFuture;

use crate::config::{HarnessConfig, ReportFormat};
use crate::context::{TestContext, run_script};
use crate::error::{HarnessError, Result, SpawnError};
use crate::result::TestResult;

/// Owns the configuration and collects results for a run of tests.
#[derive(Debug)]
pub struct Harness {
    config: HarnessConfig,
    results: Vec<TestResult>,
}

impl Harness {
    /// Validate `config`, install logging, and check the shell exists.
    pub fn init(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        crate::logging::init(&config.logging);

        let shell = resolve_executable(&config.shell.path)?;
        tracing::info!(shell = %shell.display(), "harness initialized");

        Ok(Self {
            config,
            results: Vec::new(),
        })
    }

    /// [`init`](Self::init) with configuration from [`HarnessConfig::load`].
    pub fn from_env() -> Result<Self> {
        Self::init(HarnessConfig::load()?)
    }

    /// The configuration every test runs with.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run one test and keep its result.
    pub async fn run<F>(&mut self, name: &str, script: F) -> &TestResult
    where
        F: for<'a> FnOnce(&'a mut TestContext) -> BoxFuture<'a, Result<()>>,
    {
        let result = run_script(name, &self.config, script).await;
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    /// Results so far, in run order.
    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Whether every test so far passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(TestResult::is_success)
    }

    /// Print the summary line and return the process exit code.
    #[must_use]
    pub fn teardown(self) -> ExitCode {
        let failed: Vec<&str> = self
            .results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.name.as_str())
            .collect();
        let total = self.results.len();

        tracing::info!(total, failed = failed.len(), "harness finished");
        if self.config.report != ReportFormat::Quiet {
            if failed.is_empty() {
                println!("{total} passed, 0 failed");
            } else {
                println!(
                    "{} passed, {} failed: {}",
                    total - failed.len(),
                    failed.len(),
                    failed.join(", ")
                );
            }
        }

        if failed.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Find the executable the way `execvp` would.
fn resolve_executable(path: &Path) -> Result<PathBuf> {
    let not_found = || HarnessError::Spawn(SpawnError::command_not_found(path.display().to_string()));

    if path.components().count() > 1 || path.is_absolute() {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let search = std::env::var_os("PATH").ok_or_else(not_found)?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
        .ok_or_else(not_found)
}
