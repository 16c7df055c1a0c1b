//! Shell-style glob patterns (`*`, `?`, `[seq]`, `[!seq]`).
//!
//! Names are not paths here: `*` also matches `/` and a leading `.`, and a
//! run of stars means the same as one.

use ::glob::{MatchOptions, Pattern};

use crate::error::TargetError;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    compiled: Pattern,
    options: MatchOptions,
}

impl GlobPattern {
    /// Compile a case-sensitive glob.
    pub fn new(pattern: &str) -> Result<Self, TargetError> {
        Self::build(pattern, false)
    }

    /// Compile a glob that ignores case.
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, TargetError> {
        Self::build(pattern, true)
    }

    pub(crate) fn build(pattern: &str, case_insensitive: bool) -> Result<Self, TargetError> {
        let compiled = Pattern::new(&collapse_stars(pattern))
            .map_err(|e| TargetError::InvalidGlob(format!("'{pattern}': {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            compiled,
            options: MatchOptions {
                case_sensitive: !case_insensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.compiled.matches_with(name, self.options)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Case-sensitive one-shot glob match.
pub fn glob_match(name: &str, pattern: &str) -> Result<bool, TargetError> {
    Ok(GlobPattern::new(pattern)?.matches(name))
}

// `**` is only legal as a whole path component for `glob::Pattern`.
fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}
