//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::TargetError;
use crate::types::Nodegroups;

pub const DEFAULT_TARGET_DELIM: &str = ":";
pub const DEFAULT_MAX_EXPANSION_TOKENS: usize = 10_000;
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// What grain/pillar/ipcidr/range matching answers when no minion data is
/// available because the minion data cache is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Every accepted minion is assumed to match.
    #[default]
    MatchAll,
    /// No minion matches.
    MatchNone,
}

impl MissingDataPolicy {
    pub fn as_match(&self) -> bool {
        matches!(self, MissingDataPolicy::MatchAll)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetingConfig {
    pub minion_data_cache: bool,
    pub uncached_policy: MissingDataPolicy,
    pub nodegroups: Nodegroups,
    pub max_expansion_tokens: usize,
    pub regex_size_limit: usize,
    pub permissive_acl: bool,
    pub expanded_auth_matching: bool,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            minion_data_cache: true,
            uncached_policy: MissingDataPolicy::default(),
            nodegroups: Nodegroups::new(),
            max_expansion_tokens: DEFAULT_MAX_EXPANSION_TOKENS,
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            permissive_acl: false,
            expanded_auth_matching: false,
        }
    }
}

impl TargetingConfig {
    /// Parse a JSON configuration document. Missing keys take their defaults.
    ///
    /// ```rust
    /// use tgt_core::TargetingConfig;
    /// let config = TargetingConfig::from_json_str(r#"{
    ///     "minion_data_cache": false,
    ///     "nodegroups": {"web": "web* and G@role:frontend"}
    /// }"#).unwrap();
    /// assert!(!config.minion_data_cache);
    /// assert_eq!(config.nodegroups.len(), 1);
    /// ```
    pub fn from_json_str(text: &str) -> Result<Self, TargetError> {
        let config: TargetingConfig = serde_json::from_str(text)?;
        if config.max_expansion_tokens == 0 {
            return Err(TargetError::ConfigError(
                "max_expansion_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn with_nodegroups(mut self, nodegroups: Nodegroups) -> Self {
        self.nodegroups = nodegroups;
        self
    }

    pub fn with_minion_data_cache(mut self, enabled: bool) -> Self {
        self.minion_data_cache = enabled;
        self
    }

    pub fn with_uncached_policy(mut self, policy: MissingDataPolicy) -> Self {
        self.uncached_policy = policy;
        self
    }
}
