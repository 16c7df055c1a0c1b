//! Data model types for targeting requests and authorization lists.
//!
//! Canonical string forms:
//! - Target type: `glob`, `pcre`, `list`, `grain`, `grain_pcre`, `pillar`,
//!   `pillar_pcre`, `pillar_exact`, `ipcidr`, `range`, `compound`,
//!   `compound_pillar_exact`, `nodegroup`, `data`
//! - Engine tag: one uppercase letter followed by `@`, e.g. `G@os:Debian`
//! - ACL entry: `"regex"` or `{"target": ["regex", {"regex": {"args": [...]}}]}`

mod acl;
mod nodegroup;
mod target_engine;
mod target_match;
mod target_type;

pub use acl::{
    AclEntry, ArgRules, ArgSpec, AuthCall, AuthOptions, AuthProvider, CallArgs, FunctionRule,
    FunctionRules,
};
pub use nodegroup::{NodegroupDef, Nodegroups};
pub use target_engine::TargetEngine;
pub use target_match::{MinionSet, TargetMatch};
pub use target_type::TargetType;
