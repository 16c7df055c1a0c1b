use super::*;
use crate::types::{AclEntry, AuthCall, AuthOptions, AuthProvider, CallArgs};
use yare::parameterized;

fn acl() -> Vec<AclEntry> {
    serde_json::from_value(json!([
        "test.*",
        {"web*": ["pkg.*", {"service.restart": {"args": ["nginx"]}}]},
        {"G@os:RedHat": "cmd.run"},
        {"db1": ["state.*"], "db2": ["state.*"]},
    ]))
    .unwrap()
}

fn restart(tgt: &str, service: &str) -> AuthCall {
    AuthCall::new("service.restart", tgt, "glob")
        .with_args(vec![CallArgs::from_raw(vec![json!(service)])])
}

#[parameterized(
    function_entry = { "test.ping", "*", "glob", true },
    function_entry_is_anchored = { "cmd.test.ping", "web1", "glob", false },
    target_single = { "pkg.install", "web1", "glob", true },
    target_glob = { "pkg.install", "web*", "glob", true },
    target_too_wide = { "pkg.install", "*", "glob", false },
    target_compound = { "pkg.install", "G@os:Debian", "compound", true },
    target_with_ghost = { "pkg.install", "web1,ghost", "list", false },
    grain_acl_target = { "cmd.run", "db*", "glob", true },
    grain_acl_target_miss = { "cmd.run", "web1", "glob", false },
    multi_key_entry_ignored = { "state.apply", "db1", "glob", false },
    malformed_target = { "pkg.install", "web* and", "compound", false },
    unknown_type = { "pkg.install", "web1", "teleport", false },
    empty_target_inside = { "pkg.install", "nothing*", "glob", true },
)]
fn test_auth_check(fun: &str, tgt: &str, tgt_type: &str, expected: bool) {
    assert_eq!(engine().auth_check(&acl(), fun, tgt, tgt_type), expected);
}

#[test]
fn test_auth_check_arguments() {
    let ck = engine();
    let options = AuthOptions::default();
    assert!(ck.auth_check_call(&acl(), &restart("web1", "nginx"), &options));
    assert!(!ck.auth_check_call(&acl(), &restart("web1", "sshd"), &options));
    assert!(!ck.auth_check(&acl(), "service.restart", "web1", "glob"));
}

#[test]
fn test_any_allowed_function_allows_call() {
    let call = AuthCall {
        funs: vec!["cmd.run".to_string(), "pkg.install".to_string()],
        args: vec![],
        tgt: "web1".to_string(),
        tgt_type: "glob".to_string(),
    };
    assert!(engine().auth_check_call(&acl(), &call, &AuthOptions::default()));
}

#[test]
fn test_acl_target_resolved_once_per_call() {
    let cache = Arc::new(CountingCache {
        inner: roster(),
        grains: AtomicUsize::new(0),
        pillar: AtomicUsize::new(0),
    });
    let ck = CkMinions::builder()
        .identity_store(Arc::new(roster()))
        .data_cache(cache.clone())
        .build()
        .unwrap();
    let acl: Vec<AclEntry> = serde_json::from_value(json!([{"G@os:Debian": ["pkg.*"]}])).unwrap();
    let call = AuthCall {
        funs: vec![
            "cmd.run".to_string(),
            "state.apply".to_string(),
            "pkg.install".to_string(),
        ],
        args: vec![],
        tgt: "web1".to_string(),
        tgt_type: "glob".to_string(),
    };

    assert!(ck.auth_check_call(&acl, &call, &AuthOptions::default()));
    assert_eq!(cache.grains.load(Ordering::Relaxed), 4);
}

#[test]
fn test_whitelist() {
    let options = AuthOptions {
        whitelist: vec!["sys.doc".to_string()],
        ..AuthOptions::default()
    };
    let call = AuthCall::new("sys.doc", "*", "glob");
    assert!(engine().auth_check_call(&[], &call, &options));
    assert!(!engine().auth_check_call(&[], &call, &AuthOptions::default()));
}

#[test]
fn test_publish_validate_rejects_pillar_globbing() {
    let ck = engine();
    let acl = vec![AclEntry::function("test.*")];
    let options = AuthOptions {
        publish_validate: true,
        ..AuthOptions::default()
    };
    let widened = AuthCall::new("test.ping", "tier:front*", "pillar");
    assert!(!ck.auth_check_call(&acl, &widened, &options));
    assert!(ck.auth_check_call(&acl, &widened, &AuthOptions::default()));

    let exact = AuthCall::new("test.ping", "env:prod", "pillar");
    assert!(ck.auth_check_call(&acl, &exact, &options));

    let compound = AuthCall::new("test.ping", "web* and I@tier:front*", "compound");
    assert!(!ck.auth_check_call(&acl, &compound, &options));
}

#[test]
fn test_known_minions_skip_target_resolution() {
    let options = AuthOptions {
        minions: Some(["web1".to_string()].into()),
        ..AuthOptions::default()
    };
    let call = AuthCall::new("pkg.install", "*", "glob");
    let ck = engine();
    assert!(ck.auth_check_call(&acl(), &call, &options));
    assert!(!ck.auth_check_call(&acl(), &call, &AuthOptions::default()));
}

fn expanded_engine() -> CkMinions {
    engine_with(TargetingConfig {
        expanded_auth_matching: true,
        ..config()
    })
}

#[parameterized(
    covered = { "pkg.install", "web*", "glob", true },
    partly_covered = { "pkg.install", "*", "glob", false },
    grain_target = { "cmd.run", "db1", "list", true },
    wrong_function = { "cmd.run", "web1", "glob", false },
    function_entry = { "test.ping", "*", "glob", true },
    nothing_targeted = { "pkg.install", "nothing*", "glob", false },
    unknown_type = { "pkg.install", "web1", "teleport", false },
)]
fn test_auth_check_expanded(fun: &str, tgt: &str, tgt_type: &str, expected: bool) {
    assert_eq!(expanded_engine().auth_check(&acl(), fun, tgt, tgt_type), expected);
}

#[test]
fn test_expanded_requires_every_function_on_every_minion() {
    let ck = expanded_engine();
    let call = |funs: &[&str]| AuthCall {
        funs: funs.iter().map(|f| f.to_string()).collect(),
        args: vec![],
        tgt: "web*".to_string(),
        tgt_type: "glob".to_string(),
    };
    let options = AuthOptions::default();
    assert!(ck.auth_check_call(&acl(), &call(&["pkg.install", "pkg.remove"]), &options));
    assert!(!ck.auth_check_call(&acl(), &call(&["pkg.install", "cmd.run"]), &options));
    assert!(!ck.auth_check_call(&acl(), &call(&["test.ping", "pkg.install"]), &options));
    assert!(ck.auth_check_expanded(&acl(), &restart("web2", "nginx"), &options));
    assert!(!ck.auth_check_expanded(&acl(), &restart("web2", "sshd"), &options));
}

#[test]
fn test_fill_auth_list_follows_config() {
    let provider: AuthProvider = serde_json::from_value(json!({
        "alice": ["test.*"],
        "*": ["grains.items"],
    }))
    .unwrap();
    let groups = BTreeSet::new();

    let strict = engine();
    assert_eq!(
        strict.fill_auth_list(&provider, "alice", &groups),
        vec![AclEntry::function("test.*")]
    );

    let permissive = engine_with(TargetingConfig {
        permissive_acl: true,
        ..config()
    });
    assert_eq!(permissive.fill_auth_list(&provider, "alice", &groups).len(), 2);
}
