//! Parsing of single target tokens: `(ENGINE@)?(DELIMITER@)?PATTERN`.

use serde::Serialize;

use crate::types::TargetEngine;

/// A parsed target token. `engine == None` means "use the default engine"
/// (a glob over minion ids); `delimiter == None` means the default `:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetToken {
    pub engine: Option<TargetEngine>,
    pub delimiter: Option<String>,
    pub pattern: String,
}

impl TargetToken {
    fn untagged(token: &str) -> Self {
        Self {
            engine: None,
            delimiter: None,
            pattern: token.to_string(),
        }
    }

    /// The delimiter to use for path-walking engines.
    pub fn delimiter_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.delimiter.as_deref().unwrap_or(default)
    }
}

/// Parse one target token. Never fails: anything that is not a well-formed
/// engine prefix is returned whole as the pattern of an untagged token.
///
/// Accepted forms, with `E` a known engine letter:
/// - `E@pattern`
/// - `E@d@pattern` (path engines `G P I J`; `d` is a run of characters
///   without `@`, `:` or whitespace)
/// - `Ed@pattern` (path engines; `d` a single character)
pub fn parse_target(token: &str) -> TargetToken {
    let mut chars = token.chars();
    let Some(engine) = chars.next().and_then(TargetEngine::from_letter) else {
        return TargetToken::untagged(token);
    };
    let rest = chars.as_str();

    if let Some(after_at) = rest.strip_prefix('@') {
        if after_at.is_empty() {
            return TargetToken::untagged(token);
        }
        if engine.is_path_engine() {
            if let Some((delimiter, pattern)) = split_custom_delimiter(after_at) {
                return TargetToken {
                    engine: Some(engine),
                    delimiter: Some(delimiter.to_string()),
                    pattern: pattern.to_string(),
                };
            }
        }
        return TargetToken {
            engine: Some(engine),
            delimiter: None,
            pattern: after_at.to_string(),
        };
    }

    if engine.is_path_engine() {
        let mut rest_chars = rest.chars();
        if let Some(delimiter) = rest_chars.next() {
            if let Some(pattern) = rest_chars.as_str().strip_prefix('@') {
                if delimiter != '@' && !pattern.is_empty() {
                    return TargetToken {
                        engine: Some(engine),
                        delimiter: Some(delimiter.to_string()),
                        pattern: pattern.to_string(),
                    };
                }
            }
        }
    }

    TargetToken::untagged(token)
}

fn split_custom_delimiter(s: &str) -> Option<(&str, &str)> {
    let (delimiter, pattern) = s.split_once('@')?;
    let valid = !delimiter.is_empty()
        && !pattern.is_empty()
        && !delimiter.contains(':')
        && !delimiter.chars().any(char::is_whitespace);
    valid.then_some((delimiter, pattern))
}

/// The letter of a token shaped like an engine tag (`X@...` with `X` an
/// uppercase ASCII letter), whether or not the letter is a known engine.
pub fn engine_tag_letter(token: &str) -> Option<char> {
    let mut chars = token.chars();
    let letter = chars.next()?;
    (letter.is_ascii_uppercase() && chars.next() == Some('@')).then_some(letter)
}
