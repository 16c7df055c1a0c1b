//! Resolved target results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A set of minion ids, ordered so results are stable across calls.
pub type MinionSet = BTreeSet<String>;

/// The minions selected by a target, plus any literally named minions that
/// are not registered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetMatch {
    pub minions: MinionSet,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub missing: MinionSet,
}

impl TargetMatch {
    pub fn new(minions: MinionSet) -> Self {
        Self {
            minions,
            missing: MinionSet::new(),
        }
    }

    pub fn with_missing(mut self, missing: MinionSet) -> Self {
        self.missing = missing;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.minions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.minions.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.minions.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    fn set(ids: &[&str]) -> MinionSet {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_target_match_serialization_skips_empty_missing() {
        let found = TargetMatch::new(set(&["web2", "web1"]));
        assert_json_snapshot!(found, @r###"
        {
          "minions": [
            "web1",
            "web2"
          ]
        }
        "###);
    }

    #[test]
    fn test_target_match_with_missing() {
        let found = TargetMatch::new(set(&["web1"])).with_missing(set(&["ghost"]));
        assert_eq!(found.len(), 1);
        assert!(found.contains("web1"));
        assert!(!found.contains("ghost"));
        assert_json_snapshot!(found, @r###"
        {
          "minions": [
            "web1"
          ],
          "missing": [
            "ghost"
          ]
        }
        "###);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(TargetMatch::default().is_empty());
    }
}
