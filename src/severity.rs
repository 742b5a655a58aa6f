//! Severity classification of raw (uncensored) lines.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SeverityPatterns;
use crate::error::Result;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Warning,
    Error,
    Unknown,
}

/// Matches lines against the configured patterns, first match wins in the
/// order debug, warning, error.
#[derive(Clone, Debug)]
pub struct Classifier {
    rules: Option<[(Severity, Regex); 3]>,
}

impl Classifier {
    pub fn new(patterns: &SeverityPatterns, enabled: bool) -> Result<Self> {
        // Compile even when disabled so bad patterns still fail at startup.
        let rules = [
            (Severity::Debug, Regex::new(&patterns.debug)?),
            (Severity::Warning, Regex::new(&patterns.warning)?),
            (Severity::Error, Regex::new(&patterns.error)?),
        ];

        Ok(Classifier {
            rules: enabled.then_some(rules),
        })
    }

    /// A classifier that tags everything [`Severity::Unknown`].
    pub fn disabled() -> Self {
        Classifier { rules: None }
    }

    pub fn classify(&self, line: &str) -> Severity {
        let Some(rules) = &self.rules else {
            return Severity::Unknown;
        };

        rules
            .iter()
            .find(|(_, re)| re.is_match(line))
            .map(|(severity, _)| *severity)
            .unwrap_or(Severity::Unknown)
    }
}
