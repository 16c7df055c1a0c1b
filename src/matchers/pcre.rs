//! Regular expressions over minion ids (`E@web[0-9]+`).

use regex::{Regex, RegexBuilder};

use crate::error::TargetError;

use super::MatchLimits;

/// Compile a regex that must match at the start of the subject (but need
/// not consume all of it).
pub fn compile_anchored(pattern: &str, limits: MatchLimits) -> Result<Regex, TargetError> {
    // The bare pattern must parse on its own or a stray ')' closes the group.
    compile(pattern, false, limits)?;
    compile(&format!("^(?:{pattern})"), false, limits)
}

/// Compile a regex that must consume the whole subject.
pub fn compile_full(pattern: &str, limits: MatchLimits) -> Result<Regex, TargetError> {
    compile(pattern, false, limits)?;
    compile(&format!("^(?:{pattern})$"), false, limits)
}

/// Compile an unanchored regex.
pub fn compile_search(
    pattern: &str,
    case_insensitive: bool,
    limits: MatchLimits,
) -> Result<Regex, TargetError> {
    compile(pattern, case_insensitive, limits)
}

fn compile(pattern: &str, case_insensitive: bool, limits: MatchLimits) -> Result<Regex, TargetError> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .size_limit(limits.regex_size_limit)
        .build()?)
}

pub fn pcre_match(minion_id: &str, regex: &Regex) -> bool {
    regex.is_match(minion_id)
}
