//! Output buffering and pattern matching.
//!
//! The background reader appends to an [`OutputBuffer`]; the
//! [`ExpectationEngine`] waits for a [`Pattern`] to appear in the part of the
//! buffer no earlier expectation has consumed.

mod buffer;
mod engine;
mod pattern;

pub(crate) use buffer::ReaderTask;
pub use buffer::{DEFAULT_MAX_SIZE, OutputBuffer};
pub use engine::{DEFAULT_POLL_INTERVAL, Expectation, ExpectationEngine};
pub use pattern::{CompiledRegex, DEFAULT_PROMPT, Pattern, PromptPattern};
