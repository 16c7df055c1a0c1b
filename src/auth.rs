//! Function-level authorization helpers.
//!
//! These answer "may this function be called with these arguments" given
//! an ACL. Deciding *which minions* an ACL entry covers needs the roster and
//! lives on [`crate::CkMinions`].

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::warn;

use crate::error::TargetError;
use crate::matchers::glob::GlobPattern;
use crate::matchers::pcre::{compile_anchored, compile_full};
use crate::matchers::MatchLimits;
use crate::types::{AclEntry, ArgSpec, AuthProvider, CallArgs, FunctionRule};

/// Whether `regex` matches the start of every function in `funs`.
/// An empty list or an invalid regex never matches.
pub fn match_check<S: AsRef<str>>(regex: &str, funs: &[S]) -> bool {
    if funs.is_empty() {
        return false;
    }
    match compile_anchored(regex, MatchLimits::default()) {
        Ok(re) => funs.iter().all(|fun| re.is_match(fun.as_ref())),
        Err(e) => {
            warn!(event = "Auth", phase = "MatchCheck", regex, error = %e, "invalid regular expression");
            false
        }
    }
}

/// Whether any rule admits `fun` called with `call`.
pub fn fun_check(rules: &[FunctionRule], fun: &str, call: Option<&CallArgs>) -> bool {
    rules.iter().any(|rule| match rule {
        FunctionRule::Name(regex) => match_check(regex, &[fun]),
        FunctionRule::WithArgs(map) if map.len() == 1 => map
            .iter()
            .next()
            .is_some_and(|(regex, specs)| {
                match_check(regex, &[fun]) && args_check(specs.as_slice(), call)
            }),
        FunctionRule::WithArgs(_) => false,
    })
}

/// Whether the call satisfies any of the argument specs. Positional
/// conditions bind by index; `None` conditions only require presence.
pub fn args_check(specs: &[ArgSpec], call: Option<&CallArgs>) -> bool {
    specs.iter().any(|spec| spec_admits(spec, call))
}

fn spec_admits(spec: &ArgSpec, call: Option<&CallArgs>) -> bool {
    for (idx, cond) in spec.args.iter().enumerate() {
        let Some(value) = call.and_then(|c| c.args.get(idx)) else {
            return false;
        };
        if let Some(regex) = cond {
            if !match_check(regex, &[arg_text(value)]) {
                return false;
            }
        }
    }
    for (key, cond) in &spec.kwargs {
        let Some(value) = call
            .and_then(|c| c.kwargs.as_ref())
            .and_then(|kwargs| kwargs.get(key))
        else {
            return false;
        };
        if let Some(regex) = cond {
            if !match_check(regex, &[arg_text(value)]) {
                return false;
            }
        }
    }
    true
}

fn arg_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Match a name against an ACL key: exact text, then a glob, then a regex
/// over the whole name.
pub fn expr_match(name: &str, expr: &str) -> bool {
    if name == expr {
        return true;
    }
    if GlobPattern::new(expr).is_ok_and(|glob| glob.matches(name)) {
        return true;
    }
    compile_full(expr, MatchLimits::default()).is_ok_and(|re| re.is_match(name))
}

/// Collect the ACL entries that apply to user `name` in `groups`.
///
/// Keys ending in `%` name groups. `*` applies to everyone when
/// `permissive`, and otherwise only to users no other key matched.
pub fn fill_auth_list(
    provider: &AuthProvider,
    name: &str,
    groups: &BTreeSet<String>,
    permissive: bool,
) -> Vec<AclEntry> {
    let mut acl = Vec::new();
    let mut name_matched = false;
    for (key, entries) in provider {
        if key == "*" && !permissive {
            continue;
        }
        if let Some(group) = key.strip_suffix('%') {
            if groups.contains(group) {
                acl.extend(entries.iter().cloned());
            }
        } else if expr_match(name, key) {
            name_matched = true;
            acl.extend(entries.iter().cloned());
        }
    }
    if !permissive && !name_matched {
        if let Some(entries) = provider.get("*") {
            acl.extend(entries.iter().cloned());
        }
    }
    acl
}

/// Check a function in a non-minion namespace (`wheel`, `runner`, `cloud`).
///
/// `@module` entries admit every function of that module, `@form` and
/// `@forms` entries admit the whole namespace. Mapping entries keyed the
/// same way restrict by function rules.
pub fn spec_check(
    acl: &[AclEntry],
    fun: &str,
    call: &CallArgs,
    form: &str,
) -> Result<bool, TargetError> {
    if acl.is_empty() {
        return Ok(false);
    }
    let (mod_name, fun_name) = if form == "cloud" {
        (fun, fun)
    } else {
        match fun.split_once('.') {
            Some((module, function)) if !function.contains('.') => (module, function),
            _ => {
                return Err(TargetError::InvalidInvocation(format!(
                    "'{fun}' is not of the form module.function"
                )));
            }
        }
    };
    let plural = format!("@{form}s");

    for entry in acl {
        match entry {
            AclEntry::Function(name) => {
                if let Some(rest) = name.strip_prefix('@') {
                    if rest == mod_name || rest == form || *name == plural {
                        return Ok(true);
                    }
                }
            }
            AclEntry::Target(_) => {
                let Some((key, rules)) = entry.single_target() else {
                    continue;
                };
                let Some(rest) = key.strip_prefix('@') else {
                    continue;
                };
                if rest == mod_name && fun_check(rules.as_slice(), fun_name, Some(call)) {
                    return Ok(true);
                }
                if (rest == form || key == plural) && fun_check(rules.as_slice(), fun, Some(call)) {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

pub fn wheel_check(acl: &[AclEntry], fun: &str, call: &CallArgs) -> Result<bool, TargetError> {
    spec_check(acl, fun, call, "wheel")
}

pub fn runner_check(acl: &[AclEntry], fun: &str, call: &CallArgs) -> Result<bool, TargetError> {
    spec_check(acl, fun, call, "runner")
}
