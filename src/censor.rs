//! Redaction of outgoing text.

use std::borrow::Cow;

use regex::Regex;

use crate::error::Result;

/// Replacement for every redacted match.
pub const PLACEHOLDER: &str = "*REDACTED*";

#[derive(Clone, Debug, Default)]
pub struct Censor {
    pattern: Option<Regex>,
}

impl Censor {
    /// Compiles the optional pattern. A malformed pattern is a configuration
    /// error and must be surfaced before any watch is set up.
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern.map(Regex::new).transpose()?;
        Ok(Censor { pattern })
    }

    pub fn is_enabled(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.pattern {
            Some(re) => re.replace_all(text, PLACEHOLDER),
            None => Cow::Borrowed(text),
        }
    }
}
