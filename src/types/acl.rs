//! ACL entries and call arguments checked by `auth_check`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of an authorization list.
///
/// ```yaml
/// - 'test.*'                 # function regex, any minion
/// - 'web*':                  # target -> function regexes
///     - 'pkg.*'
///     - 'service.restart':
///         args: ['nginx']
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AclEntry {
    /// A function-name regex that applies to every minion.
    Function(String),
    /// A mapping from a target to the function rules allowed on it. Must hold
    /// exactly one key to be considered.
    Target(BTreeMap<String, FunctionRules>),
}

impl AclEntry {
    pub fn function(regex: impl Into<String>) -> Self {
        AclEntry::Function(regex.into())
    }

    pub fn target(target: impl Into<String>, rules: Vec<FunctionRule>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(target.into(), FunctionRules::Many(rules));
        AclEntry::Target(map)
    }

    /// The single `(target, rules)` pair of a well-formed target entry.
    pub fn single_target(&self) -> Option<(&str, &FunctionRules)> {
        match self {
            AclEntry::Target(map) if map.len() == 1 => {
                map.iter().next().map(|(k, v)| (k.as_str(), v))
            }
            _ => None,
        }
    }
}

/// One or many function rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FunctionRules {
    One(FunctionRule),
    Many(Vec<FunctionRule>),
}

impl FunctionRules {
    pub fn as_slice(&self) -> &[FunctionRule] {
        match self {
            FunctionRules::One(rule) => std::slice::from_ref(rule),
            FunctionRules::Many(rules) => rules,
        }
    }
}

/// A function-name regex, optionally constrained by argument rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FunctionRule {
    Name(String),
    /// Single-key mapping of function regex to argument specs.
    WithArgs(BTreeMap<String, ArgRules>),
}

impl FunctionRule {
    pub fn name(regex: impl Into<String>) -> Self {
        FunctionRule::Name(regex.into())
    }

    pub fn with_args(regex: impl Into<String>, specs: Vec<ArgSpec>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(regex.into(), ArgRules::Many(specs));
        FunctionRule::WithArgs(map)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgRules {
    One(ArgSpec),
    Many(Vec<ArgSpec>),
}

impl ArgRules {
    pub fn as_slice(&self) -> &[ArgSpec] {
        match self {
            ArgRules::One(spec) => std::slice::from_ref(spec),
            ArgRules::Many(specs) => specs,
        }
    }
}

/// Positional and keyword argument regexes. `None` accepts any value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgSpec {
    #[serde(default)]
    pub args: Vec<Option<String>>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Option<String>>,
}

/// Arguments of a requested function call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Option<BTreeMap<String, Value>>,
}

impl CallArgs {
    /// Split a raw argument list, taking a trailing `{"__kwarg__": true, ...}`
    /// mapping as keyword arguments.
    pub fn from_raw(mut raw: Vec<Value>) -> Self {
        let is_kwarg = matches!(raw.last(), Some(Value::Object(map)) if map.contains_key("__kwarg__"));
        let kwargs = if is_kwarg {
            match raw.pop() {
                Some(Value::Object(map)) => Some(map.into_iter().collect()),
                _ => None,
            }
        } else {
            None
        };
        CallArgs { args: raw, kwargs }
    }
}

/// ACL entries keyed by user name pattern, or by `group%` for groups.
pub type AuthProvider = BTreeMap<String, Vec<AclEntry>>;

/// A request to run functions on a target, as checked by `auth_check`.
///
/// `args[i]` holds the arguments of `funs[i]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthCall {
    pub funs: Vec<String>,
    #[serde(default)]
    pub args: Vec<CallArgs>,
    pub tgt: String,
    #[serde(default = "default_tgt_type")]
    pub tgt_type: String,
}

fn default_tgt_type() -> String {
    "glob".to_string()
}

impl AuthCall {
    /// A single function without arguments against a target.
    pub fn new(fun: impl Into<String>, tgt: impl Into<String>, tgt_type: impl Into<String>) -> Self {
        Self {
            funs: vec![fun.into()],
            args: Vec::new(),
            tgt: tgt.into(),
            tgt_type: tgt_type.into(),
        }
    }

    pub fn with_args(mut self, args: Vec<CallArgs>) -> Self {
        self.args = args;
        self
    }

    /// The arguments of the `idx`-th function, if any were given.
    pub fn args_for(&self, idx: usize) -> Option<&CallArgs> {
        self.args.get(idx)
    }
}

/// Extra knobs for `auth_check`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthOptions {
    /// Reject targets where pillar globbing reaches more minions than exact
    /// pillar matching.
    #[serde(default)]
    pub publish_validate: bool,
    /// Functions allowed regardless of the ACL.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Already resolved target minions; skips resolving `tgt`.
    #[serde(default)]
    pub minions: Option<BTreeSet<String>>,
}
