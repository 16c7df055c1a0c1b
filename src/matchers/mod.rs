//! Matcher engines.
//!
//! Every engine letter of the target language maps to one [`MatcherKind`].
//! A pattern is compiled once per query into a [`CompiledMatcher`], which is
//! then asked about one minion at a time through a [`MinionView`]. Pattern
//! errors surface at compile time; missing or broken per-minion data only
//! ever turns into "no match" for that minion.

pub mod data;
pub mod glob;
pub mod ipcidr;
pub mod list;
pub mod pcre;
pub mod range;
pub mod subdict;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{DEFAULT_REGEX_SIZE_LIMIT, MissingDataPolicy, TargetingConfig};
use crate::error::TargetError;
use crate::traits::{LocalDataStore, RangeResolver};
use crate::types::{MinionSet, TargetEngine, TargetType};

use self::data::DataTarget;
use self::glob::GlobPattern;
use self::ipcidr::IpTarget;
use self::subdict::SubdictMatcher;

/// Bounds applied while compiling patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    pub regex_size_limit: usize,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl From<&TargetingConfig> for MatchLimits {
    fn from(config: &TargetingConfig) -> Self {
        Self {
            regex_size_limit: config.regex_size_limit,
        }
    }
}

/// How a value at the end of a document path is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchMode {
    /// Case-insensitive glob.
    Glob,
    /// Case-insensitive unanchored regex search.
    Regex,
    /// Byte-exact comparison; `*` has no special meaning.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocSource {
    Grains,
    Pillar,
}

/// Everything a matcher may ask about the minion under evaluation.
pub trait MinionView {
    fn id(&self) -> &str;

    /// The minion's grains or pillar. `Ok(None)` means no document exists.
    fn document(&self, source: DocSource) -> Result<Option<&Value>, TargetError>;

    /// `false` when minion data is not cached at all, in which case
    /// [`MinionView::uncached_policy`] decides data-driven matches.
    fn data_available(&self) -> bool {
        true
    }

    fn uncached_policy(&self) -> MissingDataPolicy {
        MissingDataPolicy::default()
    }

    /// The minion's local data store, present only on the minion itself.
    fn data_store(&self) -> Option<&dyn LocalDataStore> {
        None
    }
}

/// Collaborators and limits available while compiling a matcher.
#[derive(Clone, Copy, Default)]
pub struct MatchEnv<'a> {
    pub limits: MatchLimits,
    pub range_resolver: Option<&'a dyn RangeResolver>,
}

/// The closed set of matcher engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatcherKind {
    Glob,
    List,
    Pcre,
    Grain,
    GrainPcre,
    Pillar,
    PillarPcre,
    PillarExact,
    IpCidr,
    Range,
    Exsel,
    Data,
}

impl MatcherKind {
    /// The matcher for an engine letter inside a compound expression.
    /// Nodegroup references are expanded rather than matched, so `N@` has
    /// no matcher. With `pillar_exact`, `I@` and `J@` compare byte-exactly.
    pub fn for_engine(engine: TargetEngine, pillar_exact: bool) -> Option<Self> {
        let kind = match engine {
            TargetEngine::Grain => Self::Grain,
            TargetEngine::GrainPcre => Self::GrainPcre,
            TargetEngine::Pillar | TargetEngine::PillarPcre if pillar_exact => Self::PillarExact,
            TargetEngine::Pillar => Self::Pillar,
            TargetEngine::PillarPcre => Self::PillarPcre,
            TargetEngine::List => Self::List,
            TargetEngine::IpCidr => Self::IpCidr,
            TargetEngine::Pcre => Self::Pcre,
            TargetEngine::Range => Self::Range,
            TargetEngine::Exsel => Self::Exsel,
            TargetEngine::Nodegroup => return None,
        };
        Some(kind)
    }

    /// The matcher for a simple target type; compound and nodegroup types
    /// go through the compound evaluator instead.
    pub fn for_target_type(tgt_type: TargetType) -> Option<Self> {
        let kind = match tgt_type {
            TargetType::Glob => Self::Glob,
            TargetType::Pcre => Self::Pcre,
            TargetType::List => Self::List,
            TargetType::Grain => Self::Grain,
            TargetType::GrainPcre => Self::GrainPcre,
            TargetType::Pillar => Self::Pillar,
            TargetType::PillarPcre => Self::PillarPcre,
            TargetType::PillarExact => Self::PillarExact,
            TargetType::IpCidr => Self::IpCidr,
            TargetType::Range => Self::Range,
            TargetType::Data => Self::Data,
            TargetType::Compound | TargetType::CompoundPillarExact | TargetType::Nodegroup => {
                return None;
            }
        };
        Some(kind)
    }

    /// Whether the answer depends on cached grain or pillar documents.
    pub fn needs_minion_data(&self) -> bool {
        matches!(
            self,
            Self::Grain
                | Self::GrainPcre
                | Self::Pillar
                | Self::PillarPcre
                | Self::PillarExact
                | Self::IpCidr
                | Self::Range
        )
    }
}

/// A matcher with its pattern compiled, ready to be asked about minions.
#[derive(Debug)]
pub enum CompiledMatcher {
    Glob(GlobPattern),
    List(MinionSet),
    Pcre(Regex),
    Subdict {
        source: DocSource,
        matcher: SubdictMatcher,
    },
    IpCidr(IpTarget),
    /// `None` when no resolver is configured.
    Range(Option<MinionSet>),
    Exsel,
    /// `None` when the pattern has no value part.
    Data(Option<DataTarget>),
}

impl CompiledMatcher {
    pub fn compile(
        kind: MatcherKind,
        pattern: &str,
        delimiter: &str,
        env: &MatchEnv<'_>,
    ) -> Result<Self, TargetError> {
        let limits = env.limits;
        let subdict = |source, mode| CompiledMatcher::Subdict {
            source,
            matcher: SubdictMatcher::new(pattern, delimiter, mode, limits),
        };

        let compiled = match kind {
            MatcherKind::Glob => Self::Glob(GlobPattern::build(pattern, false)?),
            MatcherKind::List => Self::List(list::parse_id_list(pattern)),
            MatcherKind::Pcre => Self::Pcre(pcre::compile_anchored(pattern, limits)?),
            MatcherKind::Grain => subdict(DocSource::Grains, MatchMode::Glob),
            MatcherKind::GrainPcre => subdict(DocSource::Grains, MatchMode::Regex),
            MatcherKind::Pillar => subdict(DocSource::Pillar, MatchMode::Glob),
            MatcherKind::PillarPcre => subdict(DocSource::Pillar, MatchMode::Regex),
            MatcherKind::PillarExact => subdict(DocSource::Pillar, MatchMode::Exact),
            MatcherKind::IpCidr => Self::IpCidr(pattern.parse()?),
            MatcherKind::Range => match env.range_resolver {
                Some(resolver) => Self::Range(Some(range::expand_range(resolver, pattern))),
                None => {
                    warn!(
                        event = "Match",
                        phase = "Range",
                        pattern,
                        error = %TargetError::RangeUnavailable,
                        "range target matches nothing"
                    );
                    Self::Range(None)
                }
            },
            MatcherKind::Exsel => Self::Exsel,
            MatcherKind::Data => Self::Data(DataTarget::parse(pattern, delimiter)?),
        };
        Ok(compiled)
    }

    pub fn matches(&self, view: &dyn MinionView) -> bool {
        match self {
            Self::Glob(glob) => glob.matches(view.id()),
            Self::List(ids) => list::list_match(view.id(), ids),
            Self::Pcre(regex) => pcre::pcre_match(view.id(), regex),
            Self::Subdict { source, matcher } => {
                with_document(view, *source, |doc| matcher.matches(doc))
            }
            Self::IpCidr(target) => {
                with_document(view, DocSource::Grains, |grains| target.matches_grains(grains))
            }
            Self::Range(None) => false,
            Self::Range(Some(cluster)) => {
                with_document(view, DocSource::Grains, |grains| {
                    range::range_match(grains, cluster)
                })
            }
            Self::Exsel => true,
            Self::Data(Some(target)) => view.data_store().is_some_and(|store| target.matches(store)),
            Self::Data(None) => false,
        }
    }
}

fn with_document(view: &dyn MinionView, source: DocSource, f: impl FnOnce(&Value) -> bool) -> bool {
    if !view.data_available() {
        return view.uncached_policy().as_match();
    }
    match view.document(source) {
        Ok(Some(doc)) => f(doc),
        Ok(None) => false,
        Err(e) => {
            warn!(
                event = "Match",
                phase = "Document",
                minion = view.id(),
                source = ?source,
                error = %e,
                "document lookup failed, treating as no match"
            );
            false
        }
    }
}
