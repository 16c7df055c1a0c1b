//! Nodegroup definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A nodegroup definition: a compound expression string or a list of words.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NodegroupDef {
    Expr(String),
    Words(Vec<String>),
}

impl NodegroupDef {
    /// The whitespace-separated words of the definition.
    pub fn words(&self) -> Vec<String> {
        match self {
            NodegroupDef::Expr(expr) => expr.split_whitespace().map(str::to_string).collect(),
            NodegroupDef::Words(words) => words.clone(),
        }
    }
}

impl From<&str> for NodegroupDef {
    fn from(expr: &str) -> Self {
        NodegroupDef::Expr(expr.to_string())
    }
}

/// Named nodegroups, as supplied by configuration.
pub type Nodegroups = BTreeMap<String, NodegroupDef>;
