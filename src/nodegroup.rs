//! Nodegroup expansion.
//!
//! A nodegroup is a named target expression which may reference other
//! nodegroups with `N@name`. References are spliced in place wrapped in
//! parentheses. A group already being expanded higher up the same chain is
//! skipped, so mutual references terminate.

use tracing::{debug, warn};

use crate::boolexpr::is_operator;
use crate::config::DEFAULT_MAX_EXPANSION_TOKENS;
use crate::error::TargetError;
use crate::target::engine_tag_letter;
use crate::types::Nodegroups;

const REGEX_CHARS: [char; 8] = ['(', '[', '{', '\\', '?', '}', ']', ')'];

/// Expands nodegroup references against a fixed table.
#[derive(Debug, Clone, Copy)]
pub struct NodegroupExpander<'a> {
    nodegroups: &'a Nodegroups,
    max_tokens: usize,
}

impl<'a> NodegroupExpander<'a> {
    pub fn new(nodegroups: &'a Nodegroups, max_tokens: usize) -> Self {
        Self {
            nodegroups,
            max_tokens,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// The words of one group, without expanding nested references.
    ///
    /// A definition made only of plain words (no operators, engine tags or
    /// `*`) is a list of ids, returned as a single `L@a,b` word; if any of
    /// them looks like a regex it becomes `E@a|b` instead. Unknown groups
    /// yield `None`.
    pub fn definition(&self, name: &str) -> Option<Vec<String>> {
        let Some(def) = self.nodegroups.get(name) else {
            warn!(
                event = "Nodegroup",
                phase = "Lookup",
                nodegroup = name,
                "unknown nodegroup"
            );
            return None;
        };
        let words = def.words();
        match literal_group(&words) {
            Some(joined) => {
                debug!(
                    event = "Nodegroup",
                    phase = "Lookup",
                    nodegroup = name,
                    expr = joined,
                    "plain word definition"
                );
                Some(vec![joined])
            }
            None => Some(words),
        }
    }

    /// Fully expand `name`. Nested references that expand to something are
    /// wrapped in parentheses; unknown, empty and cyclic references vanish.
    pub fn expand(&self, name: &str) -> Result<Vec<String>, TargetError> {
        let mut chain = Vec::new();
        let expanded = self.expand_in(name, &mut chain)?;
        debug!(
            event = "Nodegroup",
            phase = "Expand",
            nodegroup = name,
            tokens = expanded.len()
        );
        Ok(expanded)
    }

    fn expand_in(&self, name: &str, chain: &mut Vec<String>) -> Result<Vec<String>, TargetError> {
        if chain.iter().any(|seen| seen == name) {
            warn!(
                event = "Nodegroup",
                phase = "Expand",
                nodegroup = name,
                "cyclic nodegroup reference skipped"
            );
            return Ok(Vec::new());
        }
        let Some(words) = self.definition(name) else {
            return Ok(Vec::new());
        };

        chain.push(name.to_string());
        let mut out = Vec::with_capacity(words.len());
        for word in words {
            match nodegroup_reference(&word) {
                Some(nested) => {
                    let inner = self.expand_in(nested, chain)?;
                    if !inner.is_empty() {
                        out.push("(".to_string());
                        out.extend(inner);
                        out.push(")".to_string());
                    }
                }
                None => out.push(word),
            }
            if out.len() > self.max_tokens {
                return Err(TargetError::ExpansionLimit {
                    limit: self.max_tokens,
                });
            }
        }
        chain.pop();
        Ok(out)
    }
}

/// Expand `name` from `nodegroups` with the default token limit.
pub fn expand_nodegroup(name: &str, nodegroups: &Nodegroups) -> Result<Vec<String>, TargetError> {
    NodegroupExpander::new(nodegroups, DEFAULT_MAX_EXPANSION_TOKENS).expand(name)
}

/// The group name of an `N@name` word.
pub fn nodegroup_reference(word: &str) -> Option<&str> {
    word.strip_prefix("N@").filter(|name| !name.is_empty())
}

fn literal_group(words: &[String]) -> Option<String> {
    if words.is_empty() {
        return None;
    }
    let plain = words
        .iter()
        .all(|w| !is_operator(w) && !w.contains('*') && engine_tag_letter(w).is_none());
    if !plain {
        return None;
    }
    if words.iter().any(|w| w.contains(REGEX_CHARS)) {
        Some(format!("E@{}", words.join("|")))
    } else {
        Some(format!("L@{}", words.join(",")))
    }
}
