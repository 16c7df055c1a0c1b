//! Compound target expressions.
//!
//! An expression such as `web* and G@os:Debian or ( N@dbs not L@db3 )` is
//! compiled once into a tree of matchers and then evaluated per minion.
//!
//! Compilation rules:
//! - the first word must be `(`, `not` or a target;
//! - `and`/`or` may not directly follow `(`;
//! - `not` directly after a target or `)` means `and not`;
//! - `N@group` is replaced in place by `( <definition> )`;
//! - an unknown, empty or cyclic group rejects the expression, as does a
//!   word tagged with an unknown engine letter.

use std::collections::VecDeque;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::boolexpr::{self, Expr, Op, Token};
use crate::config::DEFAULT_TARGET_DELIM;
use crate::error::TargetError;
use crate::matchers::list::parse_id_list;
use crate::matchers::{CompiledMatcher, MatchEnv, MatcherKind, MinionView};
use crate::nodegroup::NodegroupExpander;
use crate::target::{engine_tag_letter, parse_target};
use crate::types::{MinionSet, TargetEngine};

/// One leaf of a compiled compound expression.
#[derive(Debug)]
pub struct Operand {
    word: String,
    kind: MatcherKind,
    matcher: CompiledMatcher,
}

impl Operand {
    fn matches(&self, view: &dyn MinionView) -> bool {
        self.matcher.matches(view)
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn kind(&self) -> MatcherKind {
        self.kind
    }
}

/// A compiled compound expression.
#[derive(Debug)]
pub struct CompoundExpr {
    expr: Expr<Operand>,
    listed: MinionSet,
}

impl CompoundExpr {
    pub fn matches(&self, view: &dyn MinionView) -> bool {
        self.expr.eval(&mut |operand: &Operand| operand.matches(view))
    }

    /// Ids named by `L@` operands that are not directly negated.
    pub fn listed_ids(&self) -> &MinionSet {
        &self.listed
    }

    /// Distinct matcher kinds used anywhere in the expression.
    pub fn kinds(&self) -> Vec<MatcherKind> {
        self.expr
            .operands()
            .into_iter()
            .map(Operand::kind)
            .unique()
            .collect()
    }
}

enum Item {
    Word(String),
    /// End of a spliced nodegroup definition.
    Leave,
}

/// Compiles compound expressions against a nodegroup table.
#[derive(Clone, Copy)]
pub struct CompoundCompiler<'a> {
    nodegroups: NodegroupExpander<'a>,
    env: MatchEnv<'a>,
    pillar_exact: bool,
}

impl<'a> CompoundCompiler<'a> {
    pub fn new(nodegroups: NodegroupExpander<'a>, env: MatchEnv<'a>) -> Self {
        Self {
            nodegroups,
            env,
            pillar_exact: false,
        }
    }

    /// Compare `I@`/`J@` operands byte-exactly.
    pub fn pillar_exact(mut self, pillar_exact: bool) -> Self {
        self.pillar_exact = pillar_exact;
        self
    }

    /// Compile a whitespace separated expression.
    pub fn compile(&self, expression: &str) -> Result<CompoundExpr, TargetError> {
        self.compile_words(expression.split_whitespace())
    }

    /// Compile an already tokenized expression.
    pub fn compile_words<I, S>(&self, words: I) -> Result<CompoundExpr, TargetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queue: VecDeque<Item> = words
            .into_iter()
            .map(|w| Item::Word(w.as_ref().to_string()))
            .collect();
        let mut tokens: Vec<Token<Operand>> = Vec::new();
        let mut chain: Vec<String> = Vec::new();
        let mut listed = MinionSet::new();
        let mut processed = 0usize;

        while let Some(item) = queue.pop_front() {
            let word = match item {
                Item::Word(word) => word,
                Item::Leave => {
                    chain.pop();
                    continue;
                }
            };

            processed += 1;
            if processed > self.nodegroups.max_tokens() {
                return Err(TargetError::ExpansionLimit {
                    limit: self.nodegroups.max_tokens(),
                });
            }

            if let Some(op) = Op::from_word(&word) {
                push_operator(&mut tokens, op)?;
                continue;
            }

            let target = parse_target(&word);
            match target.engine {
                Some(TargetEngine::Nodegroup) => {
                    let group = target.pattern;
                    if chain.contains(&group) {
                        warn!(
                            event = "Compound",
                            phase = "Nodegroup",
                            nodegroup = group,
                            "cyclic nodegroup reference rejects the expression"
                        );
                        return Err(TargetError::InvalidExpression(format!(
                            "nodegroup '{group}' references itself"
                        )));
                    }
                    let Some(words) = self.nodegroups.definition(&group).filter(|w| !w.is_empty())
                    else {
                        return Err(TargetError::InvalidExpression(format!(
                            "nodegroup '{group}' is unknown or empty"
                        )));
                    };
                    queue.push_front(Item::Word(")".to_string()));
                    queue.push_front(Item::Leave);
                    for w in words.into_iter().rev() {
                        queue.push_front(Item::Word(w));
                    }
                    queue.push_front(Item::Word("(".to_string()));
                    chain.push(group);
                }
                Some(engine) => {
                    let kind = MatcherKind::for_engine(engine, self.pillar_exact).ok_or_else(
                        || TargetError::UnknownEngine {
                            engine: engine.to_string(),
                            token: word.clone(),
                        },
                    )?;
                    let negated = matches!(tokens.last(), Some(Token::Op(Op::Not)));
                    if engine == TargetEngine::List && !negated {
                        listed.extend(parse_id_list(&target.pattern));
                    }
                    let matcher = CompiledMatcher::compile(
                        kind,
                        &target.pattern,
                        target.delimiter_or(DEFAULT_TARGET_DELIM),
                        &self.env,
                    )?;
                    push_operand(&mut tokens, Operand { word, kind, matcher });
                }
                None => {
                    if let Some(letter) = engine_tag_letter(&word) {
                        return Err(TargetError::UnknownEngine {
                            engine: letter.to_string(),
                            token: word,
                        });
                    }
                    let matcher = CompiledMatcher::compile(
                        MatcherKind::Glob,
                        &word,
                        DEFAULT_TARGET_DELIM,
                        &self.env,
                    )?;
                    push_operand(
                        &mut tokens,
                        Operand {
                            word,
                            kind: MatcherKind::Glob,
                            matcher,
                        },
                    );
                }
            }
        }

        let operands = tokens.len();
        let expr = boolexpr::parse(tokens)?;
        debug!(
            event = "Compound",
            phase = "Compile",
            tokens = operands,
            words = processed
        );
        Ok(CompoundExpr { expr, listed })
    }
}

fn push_operator(tokens: &mut Vec<Token<Operand>>, op: Op) -> Result<(), TargetError> {
    match (tokens.last(), op) {
        (None, Op::Open | Op::Not) => {}
        (None, _) => {
            return Err(TargetError::InvalidExpression(format!(
                "expression may not begin with '{op}'"
            )));
        }
        (Some(Token::Op(Op::Open)), Op::And | Op::Or) => {
            return Err(TargetError::InvalidExpression(format!(
                "'{op}' may not follow '('"
            )));
        }
        (Some(Token::Operand(_) | Token::Op(Op::Close)), Op::Not) => {
            tokens.push(Token::Op(Op::And));
        }
        _ => {}
    }
    tokens.push(Token::Op(op));
    Ok(())
}

fn push_operand(tokens: &mut Vec<Token<Operand>>, operand: Operand) {
    tokens.push(Token::Operand(operand));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingDataPolicy;
    use crate::matchers::DocSource;
    use crate::types::{NodegroupDef, Nodegroups};
    use serde_json::{Value, json};
    use yare::parameterized;

    struct View {
        id: &'static str,
        grains: Value,
    }

    impl MinionView for View {
        fn id(&self) -> &str {
            self.id
        }

        fn document(&self, source: DocSource) -> Result<Option<&Value>, TargetError> {
            Ok(match source {
                DocSource::Grains => Some(&self.grains),
                DocSource::Pillar => None,
            })
        }

        fn uncached_policy(&self) -> MissingDataPolicy {
            MissingDataPolicy::MatchNone
        }
    }

    fn roster() -> Vec<View> {
        vec![
            View {
                id: "web1",
                grains: json!({"os": "Linux", "roles": ["web"]}),
            },
            View {
                id: "web2",
                grains: json!({"os": "Windows", "roles": ["web"]}),
            },
            View {
                id: "db1",
                grains: json!({"os": "Linux", "roles": ["db"]}),
            },
        ]
    }

    fn nodegroups() -> Nodegroups {
        [
            ("webs", "web*"),
            ("linux", "G@os:Linux"),
            ("dbs", "db1 db2"),
            ("loop_a", "N@loop_b"),
            ("loop_b", "N@loop_a"),
            ("either", "N@webs or N@dbs"),
            ("bad", "and web1"),
        ]
        .into_iter()
        .map(|(name, def)| (name.to_string(), NodegroupDef::from(def)))
        .collect()
    }

    fn select(expression: &str) -> Result<Vec<&'static str>, TargetError> {
        let groups = nodegroups();
        let compiler = CompoundCompiler::new(
            NodegroupExpander::new(&groups, 1000),
            MatchEnv::default(),
        );
        let compiled = compiler.compile(expression)?;
        Ok(roster()
            .iter()
            .filter(|view| compiled.matches(*view))
            .map(|view| view.id)
            .collect())
    }

    #[parameterized(
        and_with_list = { "G@os:Linux and L@web1,web2", vec!["web1"] },
        implicit_and_not = { "web* not G@os:Windows", vec!["web1"] },
        explicit_and_not = { "web* and not G@os:Windows", vec!["web1"] },
        leading_not = { "not web*", vec!["db1"] },
        precedence = { "db1 or web* and G@os:Windows", vec!["web2", "db1"] },
        parens = { "( db1 or web* ) and G@os:Linux", vec!["web1", "db1"] },
        not_after_paren = { "( web1 ) not G@os:Linux", Vec::<&str>::new() },
        grain_list = { "G@roles:web or G@os:Windows", vec!["web1", "web2"] },
        nodegroup = { "N@webs and N@linux", vec!["web1"] },
        nodegroup_list = { "N@dbs", vec!["db1"] },
        nested_nodegroups = { "N@either and not web2", vec!["web1", "db1"] },
        exsel_always = { "X@anything and db*", vec!["db1"] },
        pcre = { "E@web[12]", vec!["web1", "web2"] },
    )]
    fn test_compound_selection(expression: &str, expected: Vec<&str>) {
        assert_eq!(select(expression).unwrap(), expected);
    }

    #[parameterized(
        leading_and = { "and web1" },
        leading_or = { "or web1" },
        leading_close = { ") web1" },
        and_after_open = { "( and web1 )" },
        stray_close = { "web1 )" },
        unclosed = { "( web1" },
        adjacent = { "web1 web2" },
        trailing_operator = { "web1 and" },
        empty = { "" },
        bad_nodegroup = { "N@bad" },
        cyclic_group = { "N@loop_a or db1" },
        unknown_group = { "N@ghost or web1" },
        negated_unknown_group = { "not N@ghost" },
        negated_typo_after_glob = { "* not N@webz" },
        stray_regex_paren = { "E@web)|(db" },
        bad_regex = { "E@web(" },
        bad_cidr = { "S@10.0.0.1/8" },
    )]
    fn test_malformed_expressions(expression: &str) {
        assert!(matches!(
            select(expression),
            Err(TargetError::InvalidExpression(_))
                | Err(TargetError::InvalidRegex(_))
                | Err(TargetError::InvalidIpTarget(_))
        ));
    }

    #[test]
    fn test_unknown_engine_rejects_expression() {
        assert_eq!(
            select("web1 or Z@whatever").unwrap_err(),
            TargetError::UnknownEngine {
                engine: "Z".to_string(),
                token: "Z@whatever".to_string()
            }
        );
    }

    #[test]
    fn test_injection_attempt_is_rejected() {
        // Operands are matched as patterns, never interpreted.
        assert_eq!(
            select("__import__('os').system('id')").unwrap(),
            Vec::<&str>::new()
        );
        assert!(select("True or __import__('os')").unwrap().is_empty());
        assert!(select("web1 ) or ( True").is_err());
    }

    #[test]
    fn test_listed_ids_skip_negated_lists() {
        let groups = Nodegroups::new();
        let compiler = CompoundCompiler::new(
            NodegroupExpander::new(&groups, 100),
            MatchEnv::default(),
        );
        let compiled = compiler
            .compile("L@web1,ghost or not L@gone and L@db1")
            .unwrap();
        let listed: Vec<&str> = compiled.listed_ids().iter().map(String::as_str).collect();
        assert_eq!(listed, vec!["db1", "ghost", "web1"]);
        assert_eq!(compiled.kinds(), vec![MatcherKind::List]);
    }

    #[test]
    fn test_token_limit() {
        let groups = Nodegroups::new();
        let compiler = CompoundCompiler::new(
            NodegroupExpander::new(&groups, 5),
            MatchEnv::default(),
        );
        assert!(compiler.compile("a or b or c").is_ok());
        assert_eq!(
            compiler.compile("a or b or c or d").unwrap_err(),
            TargetError::ExpansionLimit { limit: 5 }
        );
    }

    #[test]
    fn test_pillar_exact_forces_exact_pillar_matchers() {
        let groups = Nodegroups::new();
        let compiler = CompoundCompiler::new(
            NodegroupExpander::new(&groups, 100),
            MatchEnv::default(),
        )
        .pillar_exact(true);
        let compiled = compiler.compile("I@role:web and J@env:prod or web*").unwrap();
        assert_eq!(
            compiled.kinds(),
            vec![MatcherKind::PillarExact, MatcherKind::Glob]
        );
        let words: Vec<&str> = compiled.expr.operands().into_iter().map(Operand::word).collect();
        assert_eq!(words, vec!["I@role:web", "J@env:prod", "web*"]);
    }

    #[test]
    fn test_compile_words_does_not_consume_caller_list() {
        let groups = Nodegroups::new();
        let compiler = CompoundCompiler::new(
            NodegroupExpander::new(&groups, 100),
            MatchEnv::default(),
        );
        let words = vec!["web1".to_string(), "or".to_string(), "db1".to_string()];
        assert!(compiler.compile_words(&words).is_ok());
        assert_eq!(words.len(), 3);
    }
}
