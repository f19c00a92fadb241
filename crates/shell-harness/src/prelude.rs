//! Convenient re-exports for writing test scripts.
//!
//! ```ignore
//! use shell_harness::prelude::*;
//! ```

// Configuration
pub use crate::config::{HarnessConfig, LineEnding, ReportFormat, ShellConfig};

// Error handling
pub use crate::error::{HarnessError, Result};

// Running tests
pub use crate::context::{TestContext, run_script};
pub use crate::harness::Harness;
pub use crate::result::{TestResult, TestStatus};

// Patterns and matches
pub use crate::expect::{Pattern, PromptPattern};
pub use crate::types::{ControlChar, Match, ProcessState};

// Signals
pub use shell_pty::PtySignal;

// Boxed script futures
pub use futures::future::BoxFuture;
