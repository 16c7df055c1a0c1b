//! Range cluster targets (`R@%web-cluster`).

use serde_json::Value;
use tracing::warn;

use crate::traits::RangeResolver;
use crate::types::MinionSet;

/// Expand `expression` with the resolver. Resolver failures are logged and
/// yield an empty cluster.
pub fn expand_range(resolver: &dyn RangeResolver, expression: &str) -> MinionSet {
    match resolver.expand_cluster(expression) {
        Ok(hosts) => hosts,
        Err(e) => {
            warn!(
                event = "Match",
                phase = "Range",
                expression,
                error = %e,
                "range expansion failed, treating as no match"
            );
            MinionSet::new()
        }
    }
}

/// Whether the minion's `fqdn` grain is a member of the expanded cluster.
pub fn range_match(grains: &Value, cluster: &MinionSet) -> bool {
    grains
        .get("fqdn")
        .and_then(Value::as_str)
        .is_some_and(|fqdn| cluster.contains(fqdn))
}
