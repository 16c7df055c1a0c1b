use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth;
use crate::compound::{CompoundCompiler, CompoundExpr};
use crate::config::{DEFAULT_TARGET_DELIM, MissingDataPolicy, TargetingConfig};
use crate::error::TargetError;
use crate::matchers::list::{missing_ids, parse_id_list};
use crate::matchers::{
    CompiledMatcher, DocSource, MatchEnv, MatchLimits, MatcherKind, MinionView,
};
use crate::metrics::{self, AuthStats, MetricsSink, QueryPhases, QueryStats};
use crate::nodegroup::NodegroupExpander;
use crate::timers::{PhaseTimer, QueryTimings};
use crate::traits::{IdentityStore, MinionDataCache, RangeResolver};
use crate::types::{
    AclEntry, AuthCall, AuthOptions, AuthProvider, FunctionRule, MinionSet, TargetMatch,
    TargetType,
};

/// Resolves target expressions against the registered minions and checks
/// ACLs. Cloneable and thread-safe; holds no per-query state.
#[derive(Clone)]
pub struct CkMinions {
    identity: Arc<dyn IdentityStore>,
    cache: Option<Arc<dyn MinionDataCache>>,
    range_resolver: Option<Arc<dyn RangeResolver>>,
    metrics: Arc<dyn MetricsSink>,
    config: TargetingConfig,
}

#[derive(Default)]
pub struct CkMinionsBuilder {
    identity: Option<Arc<dyn IdentityStore>>,
    cache: Option<Arc<dyn MinionDataCache>>,
    range_resolver: Option<Arc<dyn RangeResolver>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    config: TargetingConfig,
}

impl CkMinionsBuilder {
    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity = Some(store);
        self
    }

    pub fn data_cache(mut self, cache: Arc<dyn MinionDataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use one object as both identity store and data cache.
    pub fn roster<R>(self, roster: Arc<R>) -> Self
    where
        R: IdentityStore + MinionDataCache + 'static,
    {
        self.identity_store(roster.clone()).data_cache(roster)
    }

    pub fn range_resolver(mut self, resolver: Arc<dyn RangeResolver>) -> Self {
        self.range_resolver = Some(resolver);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn config(mut self, config: TargetingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CkMinions, TargetError> {
        let identity = self
            .identity
            .ok_or_else(|| TargetError::ConfigError("an identity store is required".to_string()))?;
        if self.config.minion_data_cache && self.cache.is_none() {
            return Err(TargetError::ConfigError(
                "minion_data_cache is enabled but no data cache was given".to_string(),
            ));
        }
        if self.config.max_expansion_tokens == 0 {
            return Err(TargetError::ConfigError(
                "max_expansion_tokens must be greater than zero".to_string(),
            ));
        }
        info!(
            event = "Engine",
            phase = "Build",
            minion_data_cache = self.config.minion_data_cache,
            nodegroups = self.config.nodegroups.len(),
            range = self.range_resolver.is_some()
        );
        Ok(CkMinions {
            identity,
            cache: self.cache,
            range_resolver: self.range_resolver,
            metrics: self.metrics.unwrap_or_else(metrics::noop_sink),
            config: self.config,
        })
    }
}

impl CkMinions {
    pub fn builder() -> CkMinionsBuilder {
        CkMinionsBuilder::default()
    }

    pub fn config(&self) -> &TargetingConfig {
        &self.config
    }

    /// The minions selected by `expr`, read as `tgt_type`.
    ///
    /// Never fails: malformed expressions, unknown types and store errors
    /// are logged and select nothing.
    pub fn check_minions(&self, expr: &str, tgt_type: &str) -> MinionSet {
        match self.try_check_minions(expr, tgt_type) {
            Ok(found) => found.minions,
            Err(e) => {
                warn!(
                    event = "Target",
                    phase = "Rejected",
                    tgt_type,
                    expr,
                    error = %e
                );
                MinionSet::new()
            }
        }
    }

    /// Like [`CkMinions::check_minions`], but reports why nothing matched
    /// and which literally named minions are not registered.
    pub fn try_check_minions(&self, expr: &str, tgt_type: &str) -> Result<TargetMatch, TargetError> {
        self.try_check_minions_delimited(expr, tgt_type, DEFAULT_TARGET_DELIM)
    }

    pub fn try_check_minions_delimited(
        &self,
        expr: &str,
        tgt_type: &str,
        delimiter: &str,
    ) -> Result<TargetMatch, TargetError> {
        let mut total = Duration::ZERO;
        let mut timings = QueryTimings::default();
        let result = PhaseTimer::measure(&mut total, || {
            let parsed = TargetType::parse(tgt_type)?;
            self.resolve_timed(expr, parsed, delimiter, &mut timings)
        });

        let stats = QueryStats {
            tgt_type: tgt_type.to_string(),
            expression: expr.to_string(),
            matched: result.as_ref().map_or(0, TargetMatch::len),
            ok: result.is_ok(),
            duration: total,
        };
        self.metrics.on_query(&stats);
        self.metrics.on_query_phases(
            &stats,
            &QueryPhases {
                list_ids_ms: metrics::millis(timings.list_ids),
                compile_ms: metrics::millis(timings.compile),
                match_ms: metrics::millis(timings.matching),
                total_ms: metrics::millis(total),
            },
        );
        result
    }

    /// Resolve a typed target with the default delimiter.
    pub fn resolve(&self, expr: &str, tgt_type: TargetType) -> Result<TargetMatch, TargetError> {
        self.resolve_delimited(expr, tgt_type, DEFAULT_TARGET_DELIM)
    }

    /// Resolve a typed target. `delimiter` applies to the simple grain and
    /// pillar types; compound operands carry their own.
    pub fn resolve_delimited(
        &self,
        expr: &str,
        tgt_type: TargetType,
        delimiter: &str,
    ) -> Result<TargetMatch, TargetError> {
        self.resolve_timed(expr, tgt_type, delimiter, &mut QueryTimings::default())
    }

    fn resolve_timed(
        &self,
        expr: &str,
        tgt_type: TargetType,
        delimiter: &str,
        timings: &mut QueryTimings,
    ) -> Result<TargetMatch, TargetError> {
        debug!(event = "Target", phase = "Request", tgt_type = %tgt_type, expr);

        let accepted = PhaseTimer::measure(&mut timings.list_ids, || {
            self.identity.list_accepted_ids()
        })?;

        let found = match tgt_type {
            TargetType::Data => {
                return Err(TargetError::UnsupportedTargetType(format!(
                    "'{tgt_type}' targets can only be matched by the minion itself"
                )));
            }
            TargetType::List => {
                let ids = parse_id_list(expr);
                let missing = missing_ids(&ids, &accepted);
                let minions: MinionSet = ids.intersection(&accepted).cloned().collect();
                TargetMatch::new(minions).with_missing(missing)
            }
            TargetType::Compound | TargetType::CompoundPillarExact | TargetType::Nodegroup => {
                let compiled = PhaseTimer::measure(&mut timings.compile, || {
                    self.compile_compound(expr, tgt_type)
                })?;
                let minions = PhaseTimer::measure(&mut timings.matching, || {
                    self.select(&accepted, |view| compiled.matches(view))
                });
                let missing = missing_ids(compiled.listed_ids(), &accepted);
                TargetMatch::new(minions).with_missing(missing)
            }
            simple => {
                let kind = MatcherKind::for_target_type(simple)
                    .ok_or_else(|| TargetError::UnsupportedTargetType(simple.to_string()))?;
                let matcher = PhaseTimer::measure(&mut timings.compile, || {
                    CompiledMatcher::compile(kind, expr, delimiter, &self.match_env())
                })?;
                let minions = PhaseTimer::measure(&mut timings.matching, || {
                    self.select(&accepted, |view| matcher.matches(view))
                });
                TargetMatch::new(minions)
            }
        };

        debug!(
            event = "Target",
            phase = "Result",
            tgt_type = %tgt_type,
            matched = found.len(),
            missing = found.missing.len()
        );
        Ok(found)
    }

    fn compile_compound(&self, expr: &str, tgt_type: TargetType) -> Result<CompoundExpr, TargetError> {
        let compiler = self
            .compound_compiler()
            .pillar_exact(tgt_type == TargetType::CompoundPillarExact);
        match tgt_type {
            TargetType::Nodegroup => compiler.compile_words([format!("N@{}", expr.trim())]),
            _ => compiler.compile(expr),
        }
    }

    fn compound_compiler(&self) -> CompoundCompiler<'_> {
        CompoundCompiler::new(
            NodegroupExpander::new(&self.config.nodegroups, self.config.max_expansion_tokens),
            self.match_env(),
        )
    }

    fn match_env(&self) -> MatchEnv<'_> {
        MatchEnv {
            limits: MatchLimits::from(&self.config),
            range_resolver: self.range_resolver.as_deref(),
        }
    }

    fn data_available(&self) -> bool {
        self.config.minion_data_cache && self.cache.is_some()
    }

    fn select(&self, accepted: &MinionSet, mut keep: impl FnMut(&dyn MinionView) -> bool) -> MinionSet {
        accepted
            .iter()
            .filter(|id| {
                let view = CachedMinion::new(
                    id.as_str(),
                    self.cache.as_deref().filter(|_| self.data_available()),
                    self.config.uncached_policy,
                );
                keep(&view)
            })
            .cloned()
            .collect()
    }

    /// Whether every minion selected by the candidate target is also
    /// selected by the full target.
    ///
    /// Targets that cannot be enumerated here (exsel operands, data-driven
    /// engines while the cache is off, `data` targets) are only accepted
    /// when both sides are the same expression of the same type.
    pub fn validate_tgt(
        &self,
        candidate_expr: &str,
        candidate_type: &str,
        full_expr: &str,
        full_type: &str,
    ) -> bool {
        let result = TargetType::parse(candidate_type).and_then(|ct| {
            let ft = TargetType::parse(full_type)?;
            self.covers(full_expr, ft, candidate_expr, ct, None)
        });
        match result {
            Ok(valid) => valid,
            Err(e) => {
                warn!(
                    event = "Validate",
                    phase = "Rejected",
                    candidate = candidate_expr,
                    full = full_expr,
                    error = %e
                );
                false
            }
        }
    }

    fn covers(
        &self,
        full_expr: &str,
        full_type: TargetType,
        candidate_expr: &str,
        candidate_type: TargetType,
        known: Option<&MinionSet>,
    ) -> Result<bool, TargetError> {
        let candidate_unbounded = known.is_none() && self.is_unbounded(candidate_expr, candidate_type)?;
        if candidate_unbounded || self.is_unbounded(full_expr, full_type)? {
            let same = candidate_type == full_type && candidate_expr == full_expr;
            debug!(
                event = "Validate",
                phase = "Unbounded",
                candidate = candidate_expr,
                full = full_expr,
                same
            );
            return Ok(same);
        }

        let full = self.resolve(full_expr, full_type)?;
        let candidate = match known {
            Some(minions) => TargetMatch::new(minions.clone()),
            None => self.resolve(candidate_expr, candidate_type)?,
        };
        Ok(candidate
            .minions
            .iter()
            .chain(candidate.missing.iter())
            .all(|id| full.minions.contains(id)))
    }

    fn is_unbounded(&self, expr: &str, tgt_type: TargetType) -> Result<bool, TargetError> {
        let kinds = match tgt_type {
            TargetType::Data => return Ok(true),
            TargetType::Compound | TargetType::CompoundPillarExact | TargetType::Nodegroup => {
                self.compile_compound(expr, tgt_type)?.kinds()
            }
            simple => MatcherKind::for_target_type(simple).into_iter().collect(),
        };
        let cache_off = !self.data_available();
        Ok(kinds
            .iter()
            .any(|kind| *kind == MatcherKind::Exsel || (cache_off && kind.needs_minion_data())))
    }

    /// Whether any ACL entry allows `fun` on the whole of `tgt`.
    pub fn auth_check(&self, acl: &[AclEntry], fun: &str, tgt: &str, tgt_type: &str) -> bool {
        self.auth_check_call(acl, &AuthCall::new(fun, tgt, tgt_type), &AuthOptions::default())
    }

    /// Full authorization check of a call against an ACL. Any internal
    /// failure denies.
    pub fn auth_check_call(&self, acl: &[AclEntry], call: &AuthCall, options: &AuthOptions) -> bool {
        let mut elapsed = Duration::ZERO;
        let expanded = self.config.expanded_auth_matching;
        let result = PhaseTimer::measure(&mut elapsed, || {
            if expanded {
                self.try_auth_check_expanded(acl, call, options)
            } else {
                self.try_auth_check(acl, call, options)
            }
        });
        let allowed = match result {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(
                    event = "Auth",
                    phase = "Rejected",
                    tgt = call.tgt.as_str(),
                    tgt_type = call.tgt_type.as_str(),
                    error = %e
                );
                false
            }
        };
        info!(
            event = "Auth",
            phase = "Result",
            funs = ?call.funs,
            tgt = call.tgt.as_str(),
            allowed,
            expanded
        );
        self.metrics.on_auth(&AuthStats {
            functions: call.funs.clone(),
            allowed,
            expanded,
            duration: elapsed,
        });
        allowed
    }

    /// Per-minion authorization: every targeted minion must be covered by
    /// ACL targets whose rules admit every requested function.
    pub fn auth_check_expanded(&self, acl: &[AclEntry], call: &AuthCall, options: &AuthOptions) -> bool {
        match self.try_auth_check_expanded(acl, call, options) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(event = "Auth", phase = "Rejected", tgt = call.tgt.as_str(), error = %e);
                false
            }
        }
    }

    fn try_auth_check(
        &self,
        acl: &[AclEntry],
        call: &AuthCall,
        options: &AuthOptions,
    ) -> Result<bool, TargetError> {
        let tgt_type = TargetType::parse(&call.tgt_type)?;
        if options.publish_validate && self.pillar_glob_reaches_more(&call.tgt, tgt_type)? {
            return Ok(false);
        }

        // Each target entry is resolved at most once per call.
        let coverage: Vec<OnceCell<bool>> = acl.iter().map(|_| OnceCell::new()).collect();
        for (idx, fun) in call.funs.iter().enumerate() {
            if options.whitelist.iter().any(|allowed| allowed == fun) {
                return Ok(true);
            }
            for (entry, covered) in acl.iter().zip(&coverage) {
                match entry {
                    AclEntry::Function(regex) => {
                        if auth::match_check(regex, &[fun]) {
                            return Ok(true);
                        }
                    }
                    AclEntry::Target(_) => {
                        let Some((valid, rules)) = entry.single_target() else {
                            debug!(event = "Auth", phase = "Acl", "skipping multi-key ACL entry");
                            continue;
                        };
                        let covered = *covered.get_or_init(|| {
                            self.covers(
                                valid,
                                TargetType::Compound,
                                &call.tgt,
                                tgt_type,
                                options.minions.as_ref(),
                            )
                            .unwrap_or_else(|e| {
                                warn!(event = "Auth", phase = "Acl", target = valid, error = %e);
                                false
                            })
                        });
                        if covered && auth::fun_check(rules.as_slice(), fun, call.args_for(idx)) {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    fn try_auth_check_expanded(
        &self,
        acl: &[AclEntry],
        call: &AuthCall,
        options: &AuthOptions,
    ) -> Result<bool, TargetError> {
        let tgt_type = TargetType::parse(&call.tgt_type)?;
        if options.publish_validate && self.pillar_glob_reaches_more(&call.tgt, tgt_type)? {
            return Ok(false);
        }
        let targeted = match &options.minions {
            Some(minions) => minions.clone(),
            None => self.resolve(&call.tgt, tgt_type)?.minions,
        };
        if targeted.is_empty() {
            return Ok(false);
        }

        let mut allowed: BTreeMap<String, Vec<FunctionRule>> = BTreeMap::new();
        for entry in acl {
            match entry {
                AclEntry::Function(regex) => {
                    if auth::match_check(regex, call.funs.as_slice()) {
                        return Ok(true);
                    }
                }
                AclEntry::Target(_) => {
                    let Some((valid, rules)) = entry.single_target() else {
                        info!(event = "Auth", phase = "Acl", "malformed ACL entry skipped");
                        continue;
                    };
                    let covered = match self.resolve(valid, TargetType::Compound) {
                        Ok(found) => found.minions,
                        Err(e) => {
                            warn!(event = "Auth", phase = "Acl", target = valid, error = %e);
                            continue;
                        }
                    };
                    for minion in covered {
                        allowed
                            .entry(minion)
                            .or_default()
                            .extend(rules.as_slice().iter().cloned());
                    }
                }
            }
        }

        for minion in &targeted {
            let Some(rules) = allowed.get(minion) else {
                debug!(event = "Auth", phase = "Expanded", minion, "minion not covered by ACL");
                return Ok(false);
            };
            let all_funs = call
                .funs
                .iter()
                .enumerate()
                .all(|(idx, fun)| auth::fun_check(rules, fun, call.args_for(idx)));
            if !all_funs {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether glob/regex pillar matching selects minions that exact pillar
    /// matching does not.
    fn pillar_glob_reaches_more(&self, tgt: &str, tgt_type: TargetType) -> Result<bool, TargetError> {
        let exact_type = tgt_type.pillar_exact_variant();
        if exact_type == tgt_type {
            return Ok(false);
        }
        let exact = self.resolve(tgt, exact_type)?;
        let loose = self.resolve(tgt, tgt_type)?;
        let reaches_more = !loose.minions.is_subset(&exact.minions);
        if reaches_more {
            warn!(
                event = "Auth",
                phase = "PublishValidate",
                tgt,
                tgt_type = %tgt_type,
                "pillar globbing reaches more minions than exact matching"
            );
        }
        Ok(reaches_more)
    }

    /// Build the ACL of user `name`, honouring `permissive_acl`.
    pub fn fill_auth_list(
        &self,
        provider: &AuthProvider,
        name: &str,
        groups: &BTreeSet<String>,
    ) -> Vec<AclEntry> {
        auth::fill_auth_list(provider, name, groups, self.config.permissive_acl)
    }
}

/// A minion seen through the data cache. Documents are fetched at most once,
/// on first use.
struct CachedMinion<'a> {
    id: &'a str,
    cache: Option<&'a dyn MinionDataCache>,
    policy: MissingDataPolicy,
    grains: OnceCell<Result<Option<Value>, TargetError>>,
    pillar: OnceCell<Result<Option<Value>, TargetError>>,
}

impl<'a> CachedMinion<'a> {
    fn new(id: &'a str, cache: Option<&'a dyn MinionDataCache>, policy: MissingDataPolicy) -> Self {
        Self {
            id,
            cache,
            policy,
            grains: OnceCell::new(),
            pillar: OnceCell::new(),
        }
    }
}

impl MinionView for CachedMinion<'_> {
    fn id(&self) -> &str {
        self.id
    }

    fn document(&self, source: DocSource) -> Result<Option<&Value>, TargetError> {
        let Some(cache) = self.cache else {
            return Ok(None);
        };
        let slot = match source {
            DocSource::Grains => &self.grains,
            DocSource::Pillar => &self.pillar,
        };
        let fetched = slot.get_or_init(|| match source {
            DocSource::Grains => cache.get_grains(self.id),
            DocSource::Pillar => cache.get_pillar(self.id),
        });
        match fetched {
            Ok(doc) => Ok(doc.as_ref()),
            Err(e) => Err(e.clone()),
        }
    }

    fn data_available(&self) -> bool {
        self.cache.is_some()
    }

    fn uncached_policy(&self) -> MissingDataPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests;
