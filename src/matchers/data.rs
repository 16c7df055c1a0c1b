//! Local data store targets (`key:value`), evaluated by a minion for itself.

use serde_json::Value;

use crate::error::TargetError;
use crate::traits::LocalDataStore;

use super::glob::GlobPattern;
use super::subdict::stringify;

/// A compiled `key:value` data target.
#[derive(Debug, Clone)]
pub struct DataTarget {
    key: String,
    value: String,
    glob: GlobPattern,
}

impl DataTarget {
    /// Split `pattern` on the first `delimiter`. A pattern without a value
    /// part never matches and is reported as `None`.
    pub fn parse(pattern: &str, delimiter: &str) -> Result<Option<Self>, TargetError> {
        let Some((key, value)) = pattern.split_once(delimiter).filter(|_| !delimiter.is_empty())
        else {
            return Ok(None);
        };
        Ok(Some(Self {
            key: key.to_string(),
            value: value.to_string(),
            glob: GlobPattern::build(value, true)?,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Scalars are glob-matched, lists match on any member, and maps match
    /// when the value names one of their keys.
    pub fn matches_value(&self, stored: &Value) -> bool {
        match stored {
            Value::Null => false,
            Value::Array(items) => items.iter().any(|item| self.glob.matches(&stringify(item))),
            Value::Object(map) => map.contains_key(&self.value),
            scalar => self.glob.matches(&stringify(scalar)),
        }
    }

    pub fn matches(&self, store: &dyn LocalDataStore) -> bool {
        store
            .get(&self.key)
            .is_some_and(|stored| self.matches_value(&stored))
    }
}
