//! Pattern types for expectations.
//!
//! Patterns match raw bytes so that offsets into the output buffer stay
//! exact even when the shell emits partial or invalid UTF-8.

use std::fmt;

use regex::bytes::Regex;

use crate::error::Result;

/// Default prompt of the shell under test.
pub const DEFAULT_PROMPT: &str = "cush> ";

/// A pattern to wait for in the shell's output.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Case-sensitive substring.
    Literal(String),

    /// The prompt configured on the test context.
    Prompt,

    /// A regular expression.
    Regex(CompiledRegex),
}

impl Pattern {
    /// Create a literal pattern.
    #[must_use]
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidPattern`](crate::HarnessError::InvalidPattern)
    /// if the expression does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(CompiledRegex::new(pattern)?))
    }

    /// Find the leftmost match in `haystack`, resolving [`Pattern::Prompt`]
    /// against `prompt`.
    ///
    /// Returns the byte range of the match.
    #[must_use]
    pub fn find(&self, haystack: &[u8], prompt: &PromptPattern) -> Option<(usize, usize)> {
        match self {
            Self::Literal(text) => find_literal(haystack, text.as_bytes()),
            Self::Prompt => prompt.find(haystack),
            Self::Regex(regex) => regex.find(haystack),
        }
    }

    /// Human-readable description used in failure messages.
    #[must_use]
    pub fn describe(&self, prompt: &PromptPattern) -> String {
        match self {
            Self::Literal(text) => format!("exact {text:?}"),
            Self::Prompt => format!("prompt {prompt}"),
            Self::Regex(regex) => format!("regex /{}/", regex.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

fn find_literal(haystack: &[u8], needle: &[u8]) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return Some((0, 0));
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| (start, start + needle.len()))
}

/// A compiled byte regex with its source text.
#[derive(Clone)]
pub struct CompiledRegex {
    source: String,
    regex: Regex,
}

impl CompiledRegex {
    /// Compile a regular expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is invalid.
    pub fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(source)?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Get the source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Byte range of the leftmost match.
    #[must_use]
    pub fn find(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        self.regex.find(haystack).map(|m| (m.start(), m.end()))
    }
}

impl fmt::Debug for CompiledRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledRegex").field(&self.source).finish()
    }
}

/// The pattern marking that the shell is ready for the next command.
///
/// How much of a prompt is fixed text is up to the shell under test, so the
/// prompt may be either literal text or a regular expression.
#[derive(Debug, Clone)]
pub struct PromptPattern(PromptKind);

#[derive(Debug, Clone)]
enum PromptKind {
    Literal(String),
    Regex(CompiledRegex),
}

impl PromptPattern {
    /// Compile a prompt pattern from a regular expression.
    pub fn new(source: &str) -> Result<Self> {
        CompiledRegex::new(source).map(|regex| Self(PromptKind::Regex(regex)))
    }

    /// A prompt that is matched literally.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self(PromptKind::Literal(text.into()))
    }

    /// Get the source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match &self.0 {
            PromptKind::Literal(text) => text,
            PromptKind::Regex(regex) => regex.as_str(),
        }
    }

    /// Byte range of the leftmost prompt in `haystack`.
    #[must_use]
    pub fn find(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        match &self.0 {
            PromptKind::Literal(text) => find_literal(haystack, text.as_bytes()),
            PromptKind::Regex(regex) => regex.find(haystack),
        }
    }
}

impl Default for PromptPattern {
    fn default() -> Self {
        Self::literal(DEFAULT_PROMPT)
    }
}

impl fmt::Display for PromptPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            PromptKind::Literal(text) => write!(f, "{text:?}"),
            PromptKind::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}
