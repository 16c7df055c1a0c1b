//! Path-walking matches over nested grain/pillar documents.
//!
//! An expression `a:b:c` is tried as key `a:b` with value `c` first, then as
//! key `a` with value `b:c`, so the delimiter may also appear inside values.
//! Lists are searched member by member; `*` as a key means "the whole
//! document" and `*` as a value means "the key exists".

use std::cell::RefCell;
use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use super::glob::GlobPattern;
use super::pcre::compile_search;
use super::{MatchLimits, MatchMode};

/// Upper bound on recursive sub-matches for one document.
const MAX_SUBMATCHES: usize = 10_000;

/// Look up `key` (a delimited path) in a document of nested maps and lists.
///
/// A numeric path component indexes into a list; any other component on a
/// list selects the first embedded map containing that key.
pub fn traverse_dict_and_list<'a>(data: &'a Value, key: &str, delimiter: &str) -> Option<&'a Value> {
    let mut ptr = data;
    for each in key.split(delimiter) {
        ptr = match ptr {
            Value::Object(map) => map.get(each)?,
            Value::Array(items) => match each.parse::<usize>() {
                Ok(idx) => items.get(idx)?,
                Err(_) => items
                    .iter()
                    .filter_map(Value::as_object)
                    .find_map(|embedded| embedded.get(each))?,
            },
            _ => return None,
        };
    }
    Some(ptr)
}

/// One-shot subdictionary match with default limits.
pub fn subdict_match(data: &Value, expr: &str, delimiter: &str, mode: MatchMode) -> bool {
    SubdictMatcher::new(expr, delimiter, mode, MatchLimits::default()).matches(data)
}

/// A reusable subdictionary matcher. Compiled value patterns are cached, so
/// one instance should be used for every document of a query.
#[derive(Debug)]
pub struct SubdictMatcher {
    expr: String,
    delimiter: String,
    mode: MatchMode,
    limits: MatchLimits,
    max_submatches: usize,
    compiled: RefCell<HashMap<String, Option<ValuePattern>>>,
}

/// A compiled value pattern, cached per distinct pattern text.
#[derive(Debug)]
enum ValuePattern {
    Glob(GlobPattern),
    Regex(Regex),
}

impl ValuePattern {
    fn is_match(&self, text: &str) -> bool {
        match self {
            ValuePattern::Glob(glob) => glob.matches(text),
            ValuePattern::Regex(regex) => regex.is_match(text),
        }
    }
}

impl SubdictMatcher {
    pub fn new(expr: &str, delimiter: &str, mode: MatchMode, limits: MatchLimits) -> Self {
        Self {
            expr: expr.to_string(),
            delimiter: delimiter.to_string(),
            mode,
            limits,
            max_submatches: MAX_SUBMATCHES,
            compiled: RefCell::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn with_max_submatches(mut self, max_submatches: usize) -> Self {
        self.max_submatches = max_submatches;
        self
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn matches(&self, data: &Value) -> bool {
        let mut budget = self.max_submatches;
        if self.match_expr(data, &self.expr, &mut budget) {
            return true;
        }
        if budget == 0 {
            warn!(
                event = "Match",
                phase = "Subdict",
                expr = self.expr,
                "sub-match budget exhausted, treating as no match"
            );
        }
        false
    }

    fn match_expr(&self, data: &Value, expr: &str, budget: &mut usize) -> bool {
        if *budget == 0 || self.delimiter.is_empty() {
            return false;
        }
        *budget -= 1;

        let splits: Vec<&str> = expr.split(self.delimiter.as_str()).collect();
        if splits.len() == 1 {
            return false;
        }

        for idx in (1..splits.len()).rev() {
            let key = splits[..idx].join(&self.delimiter);
            let (matchstr, node) = if key == "*" {
                (expr.to_string(), Some(data))
            } else {
                (
                    splits[idx..].join(&self.delimiter),
                    traverse_dict_and_list(data, &key, &self.delimiter),
                )
            };

            match node {
                None => continue,
                Some(Value::Object(map)) if map.is_empty() => continue,
                Some(node @ Value::Object(map)) => {
                    if self.dict_match(node, map, &matchstr, budget) {
                        return true;
                    }
                }
                Some(Value::Array(items)) => {
                    for member in items {
                        if let Value::Object(map) = member {
                            if self.dict_match(member, map, &matchstr, budget) {
                                return true;
                            }
                        }
                        if self.value_match(member, &matchstr) {
                            return true;
                        }
                    }
                }
                Some(scalar) => {
                    if self.value_match(scalar, &matchstr) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn dict_match(
        &self,
        node: &Value,
        map: &Map<String, Value>,
        pattern: &str,
        budget: &mut usize,
    ) -> bool {
        let exact = self.mode == MatchMode::Exact;
        let wildcard_prefix = format!("*{}", self.delimiter);
        let (wildcard, pattern) = match pattern.strip_prefix(wildcard_prefix.as_str()) {
            Some(rest) if !exact => (true, rest),
            _ => (false, pattern),
        };

        if !exact && pattern == "*" {
            return true;
        }
        if map.contains_key(pattern) {
            return true;
        }
        if self.match_expr(node, pattern, budget) {
            return true;
        }
        if wildcard {
            for value in map.values() {
                let found = match value {
                    Value::Object(inner) => self.dict_match(value, inner, pattern, budget),
                    Value::Array(items) => items.iter().any(|item| self.value_match(item, pattern)),
                    scalar => self.value_match(scalar, pattern),
                };
                if found {
                    return true;
                }
            }
        }
        false
    }

    fn value_match(&self, target: &Value, pattern: &str) -> bool {
        let text = stringify(target);
        if self.mode == MatchMode::Exact {
            return text == pattern;
        }

        let mut compiled = self.compiled.borrow_mut();
        let value_pattern = compiled
            .entry(pattern.to_string())
            .or_insert_with(|| self.compile(pattern));
        value_pattern.as_ref().is_some_and(|p| p.is_match(&text))
    }

    fn compile(&self, pattern: &str) -> Option<ValuePattern> {
        let compiled = match self.mode {
            MatchMode::Glob => GlobPattern::build(pattern, true).map(ValuePattern::Glob),
            MatchMode::Regex => compile_search(pattern, true, self.limits).map(ValuePattern::Regex),
            MatchMode::Exact => return None,
        };
        match compiled {
            Ok(value_pattern) => Some(value_pattern),
            Err(e) => {
                warn!(event = "Match", phase = "Subdict", pattern, error = %e, "invalid value pattern");
                None
            }
        }
    }
}

/// Render a scalar the way targets spell it: strings as-is, booleans as
/// `true`/`false`, null as `none`, anything else as JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "none".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
