//! Targeting evaluated by a minion for itself.
//!
//! A minion receiving a published job checks whether the job's target
//! selects it, using its own id, grains, pillar and local data store. The
//! engines are the ones [`crate::CkMinions`] uses, so both sides agree.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::compound::CompoundCompiler;
use crate::config::{DEFAULT_TARGET_DELIM, TargetingConfig};
use crate::error::TargetError;
use crate::matchers::list::parse_id_list;
use crate::matchers::{CompiledMatcher, DocSource, MatchEnv, MatchLimits, MatcherKind, MinionView};
use crate::nodegroup::NodegroupExpander;
use crate::traits::{LocalDataStore, RangeResolver};
use crate::types::{Nodegroups, TargetType};

/// A single minion's view of itself.
#[derive(Clone)]
pub struct MinionMatcher {
    id: String,
    grains: Option<Value>,
    pillar: Option<Value>,
    data_store: Option<Arc<dyn LocalDataStore>>,
    range_resolver: Option<Arc<dyn RangeResolver>>,
    nodegroups: Nodegroups,
    limits: MatchLimits,
    max_tokens: usize,
}

impl MinionMatcher {
    pub fn new(id: impl Into<String>) -> Self {
        let config = TargetingConfig::default();
        Self {
            id: id.into(),
            grains: None,
            pillar: None,
            data_store: None,
            range_resolver: None,
            nodegroups: Nodegroups::new(),
            limits: MatchLimits::from(&config),
            max_tokens: config.max_expansion_tokens,
        }
    }

    pub fn with_grains(mut self, grains: Value) -> Self {
        self.grains = Some(grains);
        self
    }

    pub fn with_pillar(mut self, pillar: Value) -> Self {
        self.pillar = Some(pillar);
        self
    }

    pub fn with_data_store(mut self, store: Arc<dyn LocalDataStore>) -> Self {
        self.data_store = Some(store);
        self
    }

    pub fn with_range_resolver(mut self, resolver: Arc<dyn RangeResolver>) -> Self {
        self.range_resolver = Some(resolver);
        self
    }

    /// Take nodegroups and limits from a targeting configuration. The
    /// cache settings do not apply: a minion always has its own data.
    pub fn with_config(mut self, config: &TargetingConfig) -> Self {
        self.nodegroups = config.nodegroups.clone();
        self.limits = MatchLimits::from(config);
        self.max_tokens = config.max_expansion_tokens;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether `expr`, read as `tgt_type`, selects this minion. Any error
    /// means it does not.
    pub fn matches(&self, expr: &str, tgt_type: &str) -> bool {
        let result = TargetType::parse(tgt_type).and_then(|tt| self.try_matches(expr, tt));
        match result {
            Ok(selected) => selected,
            Err(e) => {
                warn!(
                    event = "Minion",
                    phase = "Rejected",
                    minion = self.id.as_str(),
                    tgt_type,
                    expr,
                    error = %e
                );
                false
            }
        }
    }

    pub fn try_matches(&self, expr: &str, tgt_type: TargetType) -> Result<bool, TargetError> {
        self.try_matches_delimited(expr, tgt_type, DEFAULT_TARGET_DELIM)
    }

    pub fn try_matches_delimited(
        &self,
        expr: &str,
        tgt_type: TargetType,
        delimiter: &str,
    ) -> Result<bool, TargetError> {
        let env = MatchEnv {
            limits: self.limits,
            range_resolver: self.range_resolver.as_deref(),
        };
        let selected = match tgt_type {
            TargetType::List => parse_id_list(expr).contains(&self.id),
            TargetType::Compound | TargetType::CompoundPillarExact | TargetType::Nodegroup => {
                let compiler = CompoundCompiler::new(
                    NodegroupExpander::new(&self.nodegroups, self.max_tokens),
                    env,
                )
                .pillar_exact(tgt_type == TargetType::CompoundPillarExact);
                let compiled = match tgt_type {
                    TargetType::Nodegroup => compiler.compile_words([format!("N@{}", expr.trim())])?,
                    _ => compiler.compile(expr)?,
                };
                compiled.matches(self)
            }
            simple => {
                let kind = MatcherKind::for_target_type(simple)
                    .ok_or_else(|| TargetError::UnsupportedTargetType(simple.to_string()))?;
                CompiledMatcher::compile(kind, expr, delimiter, &env)?.matches(self)
            }
        };
        debug!(
            event = "Minion",
            phase = "Match",
            minion = self.id.as_str(),
            tgt_type = %tgt_type,
            selected
        );
        Ok(selected)
    }
}

impl MinionView for MinionMatcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn document(&self, source: DocSource) -> Result<Option<&Value>, TargetError> {
        Ok(match source {
            DocSource::Grains => self.grains.as_ref(),
            DocSource::Pillar => self.pillar.as_ref(),
        })
    }

    fn data_store(&self) -> Option<&dyn LocalDataStore> {
        self.data_store.as_deref()
    }
}
