use serde_json::Value;

use crate::error::TargetError;
use crate::types::MinionSet;

/// Source of registered minion ids (the key store).
pub trait IdentityStore: Send + Sync {
    /// Ids whose keys are accepted; only these can be targeted.
    fn list_accepted_ids(&self) -> Result<MinionSet, TargetError>;

    /// Every known id, including pending and rejected keys.
    fn list_all_ids(&self) -> Result<MinionSet, TargetError> {
        self.list_accepted_ids()
    }
}

/// Cached grain and pillar documents, keyed by minion id.
///
/// `Ok(None)` means the minion has no cached document.
pub trait MinionDataCache: Send + Sync {
    fn get_grains(&self, minion_id: &str) -> Result<Option<Value>, TargetError>;

    fn get_pillar(&self, minion_id: &str) -> Result<Option<Value>, TargetError>;
}

/// Expands range-cluster expressions to sets of fully qualified host names.
pub trait RangeResolver: Send + Sync {
    fn expand_cluster(&self, expression: &str) -> Result<MinionSet, TargetError>;
}

/// A minion's local key/value store, read by the `data` matcher.
pub trait LocalDataStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}
