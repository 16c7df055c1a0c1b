// src/lib.rs
//! Minion targeting: decide which registered minions a target expression
//! selects, and whether an ACL allows a call against them.
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tgt_core::{CkMinions, MemoryRoster};
//!
//! let roster = MemoryRoster::new()
//!     .with_minion("web1", Some(json!({"os": "Debian"})), None)
//!     .with_minion("db1", Some(json!({"os": "RedHat"})), None);
//! let ck = CkMinions::builder().roster(Arc::new(roster)).build().unwrap();
//!
//! let found = ck.check_minions("web* or G@os:RedHat", "compound");
//! assert_eq!(found.len(), 2);
//! ```

pub use config::{MissingDataPolicy, TargetingConfig};
pub use engine::{CkMinions, CkMinionsBuilder};
pub use error::TargetError;
pub use memory::{MemoryDataStore, MemoryRoster, MinionRecord, StaticRangeResolver};
pub use minion::MinionMatcher;
pub use nodegroup::{NodegroupExpander, expand_nodegroup};
pub use traits::{IdentityStore, LocalDataStore, MinionDataCache, RangeResolver};
pub use types::*;

pub mod auth;
pub mod boolexpr;
pub mod compound;
mod config;
mod engine;
mod error;
pub mod matchers;
mod memory;
pub mod metrics;
mod minion;
mod nodegroup;
pub mod target;
mod timers;
mod traits;
mod types;
