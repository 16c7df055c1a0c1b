use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::memory::{MemoryRoster, StaticRangeResolver};
use crate::types::{NodegroupDef, Nodegroups};
use serde_json::json;

mod acl;

fn roster() -> MemoryRoster {
    MemoryRoster::new()
        .with_minion(
            "web1",
            Some(json!({
                "os": "Debian",
                "fqdn": "web1.example.com",
                "ipv4": ["10.0.0.1", "127.0.0.1"],
                "roles": ["nginx"],
            })),
            Some(json!({"env": "prod", "tier": "front*"})),
        )
        .with_minion(
            "web2",
            Some(json!({
                "os": "Debian",
                "fqdn": "web2.example.com",
                "ipv4": ["10.0.0.2", "127.0.0.1"],
                "roles": ["nginx", "cache"],
            })),
            Some(json!({"env": "staging", "tier": "frontend"})),
        )
        .with_minion(
            "db1",
            Some(json!({
                "os": "RedHat",
                "fqdn": "db1.example.com",
                "ipv4": ["10.0.1.1"],
                "roles": ["postgres"],
            })),
            Some(json!({"env": "prod", "tier": "backend"})),
        )
        .with_minion(
            "db2",
            Some(json!({
                "os": "RedHat",
                "fqdn": "db2.example.com",
                "ipv4": ["10.0.1.2"],
            })),
            None,
        )
        .with_pending("web3")
}

fn nodegroups() -> Nodegroups {
    let mut groups = Nodegroups::new();
    for (name, def) in [
        ("webs", NodegroupDef::from("web*")),
        (
            "dbs",
            NodegroupDef::Words(vec!["db1".to_string(), "db2".to_string()]),
        ),
        ("prod", NodegroupDef::from("I@env:prod")),
        ("everything", NodegroupDef::from("N@webs or N@dbs")),
        ("loop_a", NodegroupDef::from("N@loop_b")),
        ("loop_b", NodegroupDef::from("N@loop_a")),
        ("empty", NodegroupDef::Words(vec![])),
    ] {
        groups.insert(name.to_string(), def);
    }
    groups
}

fn config() -> TargetingConfig {
    TargetingConfig::default().with_nodegroups(nodegroups())
}

fn engine_with(config: TargetingConfig) -> CkMinions {
    CkMinions::builder()
        .roster(Arc::new(roster()))
        .range_resolver(Arc::new(
            StaticRangeResolver::new()
                .with_cluster("%web", ["web1.example.com", "web2.example.com"]),
        ))
        .config(config)
        .build()
        .expect("engine should build")
}

fn engine() -> CkMinions {
    engine_with(config())
}

fn uncached_engine(policy: MissingDataPolicy) -> CkMinions {
    CkMinions::builder()
        .identity_store(Arc::new(roster()))
        .config(
            config()
                .with_minion_data_cache(false)
                .with_uncached_policy(policy),
        )
        .build()
        .expect("engine should build")
}

fn ids(found: &MinionSet) -> Vec<&str> {
    found.iter().map(String::as_str).collect()
}

/// Counts document fetches.
struct CountingCache {
    inner: MemoryRoster,
    grains: AtomicUsize,
    pillar: AtomicUsize,
}

impl MinionDataCache for CountingCache {
    fn get_grains(&self, minion_id: &str) -> Result<Option<Value>, TargetError> {
        self.grains.fetch_add(1, Ordering::Relaxed);
        self.inner.get_grains(minion_id)
    }

    fn get_pillar(&self, minion_id: &str) -> Result<Option<Value>, TargetError> {
        self.pillar.fetch_add(1, Ordering::Relaxed);
        self.inner.get_pillar(minion_id)
    }
}

struct BrokenCache;

impl MinionDataCache for BrokenCache {
    fn get_grains(&self, _minion_id: &str) -> Result<Option<Value>, TargetError> {
        Err(TargetError::StoreError("cache offline".to_string()))
    }

    fn get_pillar(&self, _minion_id: &str) -> Result<Option<Value>, TargetError> {
        Err(TargetError::StoreError("cache offline".to_string()))
    }
}

struct BrokenIdentity;

impl IdentityStore for BrokenIdentity {
    fn list_accepted_ids(&self) -> Result<MinionSet, TargetError> {
        Err(TargetError::StoreError("key store offline".to_string()))
    }
}

#[derive(Clone)]
struct SharedLogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

struct SharedLogWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogBuffer {
    type Writer = SharedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriter(Arc::clone(&self.0))
    }
}

impl std::io::Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_builder_requires_identity_store() {
    let result = CkMinions::builder().build();
    assert!(matches!(result, Err(TargetError::ConfigError(_))));
}

#[test]
fn test_builder_requires_cache_when_enabled() {
    let result = CkMinions::builder()
        .identity_store(Arc::new(roster()))
        .build();
    assert!(matches!(result, Err(TargetError::ConfigError(_))));

    let result = CkMinions::builder()
        .identity_store(Arc::new(roster()))
        .config(TargetingConfig::default().with_minion_data_cache(false))
        .build();
    assert!(result.is_ok());
}

#[test]
fn test_builder_rejects_zero_token_limit() {
    let config = TargetingConfig {
        max_expansion_tokens: 0,
        ..TargetingConfig::default()
    };
    let result = CkMinions::builder()
        .roster(Arc::new(roster()))
        .config(config)
        .build();
    assert!(matches!(result, Err(TargetError::ConfigError(_))));
}

#[test]
fn test_engine_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CkMinions>();
}

#[test]
fn test_documents_fetched_once_per_minion() {
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

    let found = ck.check_minions("G@os:Debian and G@roles:nginx and S@10.0.0.0/8", "compound");
    assert_eq!(ids(&found), vec!["web1", "web2"]);
    assert_eq!(cache.grains.load(Ordering::Relaxed), 4);
    assert_eq!(cache.pillar.load(Ordering::Relaxed), 0);
}

#[test]
fn test_repeated_queries_are_identical() {
    let ck = engine();
    let expr = "( web* or N@dbs ) and not G@os:RedHat or I@env:prod";
    let first = ck.try_check_minions(expr, "compound").unwrap();
    for _ in 0..5 {
        assert_eq!(ck.try_check_minions(expr, "compound").unwrap(), first);
    }
}

#[test]
fn test_concurrent_queries_agree() {
    let ck = Arc::new(engine());
    let expected = ck.check_minions("N@everything and not L@db2", "compound");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ck = Arc::clone(&ck);
            std::thread::spawn(move || {
                (0..50)
                    .map(|_| ck.check_minions("N@everything and not L@db2", "compound"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for handle in handles {
        for found in handle.join().unwrap() {
            assert_eq!(found, expected);
        }
    }
    assert_eq!(ids(&expected), vec!["db1", "web1", "web2"]);
}
