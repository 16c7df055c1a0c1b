//! In-memory implementations of the collaborator traits.
//!
//! Useful for tests, tooling, and deployments that already hold the roster in
//! memory. All types are read-only once built and safe to share across threads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TargetError;
use crate::traits::{IdentityStore, LocalDataStore, MinionDataCache, RangeResolver};
use crate::types::MinionSet;

/// One registered minion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinionRecord {
    #[serde(default = "default_accepted")]
    pub accepted: bool,
    #[serde(default)]
    pub grains: Option<Value>,
    #[serde(default)]
    pub pillar: Option<Value>,
}

fn default_accepted() -> bool {
    true
}

impl Default for MinionRecord {
    fn default() -> Self {
        Self {
            accepted: true,
            grains: None,
            pillar: None,
        }
    }
}

/// A roster of minions with their cached grains and pillar.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MemoryRoster {
    minions: BTreeMap<String, MinionRecord>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a roster from a JSON object of `id -> {accepted, grains, pillar}`.
    pub fn from_json_str(text: &str) -> Result<Self, TargetError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Add an accepted minion with the given documents.
    pub fn with_minion(
        mut self,
        id: impl Into<String>,
        grains: Option<Value>,
        pillar: Option<Value>,
    ) -> Self {
        self.minions.insert(
            id.into(),
            MinionRecord {
                accepted: true,
                grains,
                pillar,
            },
        );
        self
    }

    /// Add a minion whose key has not been accepted.
    pub fn with_pending(mut self, id: impl Into<String>) -> Self {
        self.minions.insert(
            id.into(),
            MinionRecord {
                accepted: false,
                ..MinionRecord::default()
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.minions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minions.is_empty()
    }
}

impl IdentityStore for MemoryRoster {
    fn list_accepted_ids(&self) -> Result<MinionSet, TargetError> {
        Ok(self
            .minions
            .iter()
            .filter(|(_, record)| record.accepted)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn list_all_ids(&self) -> Result<MinionSet, TargetError> {
        Ok(self.minions.keys().cloned().collect())
    }
}

impl MinionDataCache for MemoryRoster {
    fn get_grains(&self, minion_id: &str) -> Result<Option<Value>, TargetError> {
        Ok(self.minions.get(minion_id).and_then(|r| r.grains.clone()))
    }

    fn get_pillar(&self, minion_id: &str) -> Result<Option<Value>, TargetError> {
        Ok(self.minions.get(minion_id).and_then(|r| r.pillar.clone()))
    }
}

/// A range resolver backed by a fixed table of cluster expressions.
#[derive(Debug, Clone, Default)]
pub struct StaticRangeResolver {
    clusters: BTreeMap<String, MinionSet>,
}

impl StaticRangeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster<I, S>(mut self, expression: impl Into<String>, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clusters
            .insert(expression.into(), hosts.into_iter().map(Into::into).collect());
        self
    }
}

impl RangeResolver for StaticRangeResolver {
    fn expand_cluster(&self, expression: &str) -> Result<MinionSet, TargetError> {
        self.clusters
            .get(expression)
            .cloned()
            .ok_or_else(|| TargetError::RangeError(format!("unknown cluster '{expression}'")))
    }
}

/// A minion-local key/value store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MemoryDataStore {
    values: BTreeMap<String, Value>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl LocalDataStore for MemoryDataStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}
