//! Vendor-agnostic metrics collection via a pluggable sink.
//!
//! The engine reports every targeting query and every authorization check
//! to a [`MetricsSink`] handed to [`crate::CkMinionsBuilder::metrics_sink`].
//! Without one, a no-op sink is used. Each engine owns its sink, so
//! separate engines (tenants, tests) never see each other's events.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use tgt_core::metrics::{AuthStats, MetricsSink, QueryStats};
//!
//! #[derive(Default)]
//! struct Counter {
//!     queries: AtomicU64,
//! }
//!
//! impl MetricsSink for Counter {
//!     fn on_query(&self, stats: &QueryStats) {
//!         self.queries.fetch_add(1, Ordering::Relaxed);
//!         eprintln!("{} {} -> {} minions", stats.tgt_type, stats.expression, stats.matched);
//!     }
//!
//!     fn on_auth(&self, _stats: &AuthStats) {}
//! }
//!
//! let sink = Arc::new(Counter::default());
//! let _ = tgt_core::CkMinions::builder().metrics_sink(sink.clone());
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// Snapshot of one targeting query, passed to [`MetricsSink::on_query`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    /// Declared target type, as given by the caller
    pub tgt_type: String,
    /// The target expression
    pub expression: String,
    /// Number of minions selected
    pub matched: usize,
    /// `false` when the query failed closed
    pub ok: bool,
    /// Total wall-clock time of the query
    pub duration: Duration,
}

/// Per-phase timing of a targeting query. All times are in milliseconds.
///
/// * `list_ids_ms` - reading accepted ids from the identity store
/// * `compile_ms` - parsing the expression and compiling patterns
/// * `match_ms` - evaluating the compiled expression for every minion
/// * `total_ms` - the whole query
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryPhases {
    pub list_ids_ms: f64,
    pub compile_ms: f64,
    pub match_ms: f64,
    pub total_ms: f64,
}

impl QueryPhases {
    /// Time not accounted for in measured phases.
    pub fn overhead_ms(&self) -> f64 {
        self.total_ms - (self.list_ids_ms + self.compile_ms + self.match_ms)
    }
}

/// Snapshot of one authorization check, passed to [`MetricsSink::on_auth`].
#[derive(Debug, Clone, Serialize)]
pub struct AuthStats {
    /// Requested functions
    pub functions: Vec<String>,
    pub allowed: bool,
    /// Whether the expanded (per-minion) check was used
    pub expanded: bool,
    pub duration: Duration,
}

/// Consumer of engine metrics.
///
/// Called synchronously on the query path, possibly from many threads at
/// once; implementations should be cheap and must not block.
pub trait MetricsSink: Send + Sync {
    fn on_query(&self, stats: &QueryStats);

    fn on_auth(&self, stats: &AuthStats);

    /// Optional phase breakdown of a query.
    fn on_query_phases(&self, _stats: &QueryStats, _phases: &QueryPhases) {}
}

/// No-op sink; metrics are silently dropped.
#[derive(Debug, Default)]
pub struct NoOpSink;

impl MetricsSink for NoOpSink {
    fn on_query(&self, _stats: &QueryStats) {}
    fn on_auth(&self, _stats: &AuthStats) {}
}

pub(crate) fn noop_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NoOpSink)
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_stats_serialization() {
        let stats = QueryStats {
            tgt_type: "compound".to_string(),
            expression: "web* and G@os:Debian".to_string(),
            matched: 3,
            ok: true,
            duration: Duration::from_millis(42),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["matched"], 3);
        assert_eq!(json["tgt_type"], "compound");
        assert_eq!(json["duration"]["secs"], 0);
    }

    #[test]
    fn test_phases_overhead() {
        let phases = QueryPhases {
            list_ids_ms: 1.0,
            compile_ms: 0.5,
            match_ms: 2.0,
            total_ms: 4.0,
        };
        assert!((phases.overhead_ms() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_noop_sink_accepts_events() {
        let sink = noop_sink();
        let stats = QueryStats {
            tgt_type: "glob".to_string(),
            expression: "*".to_string(),
            matched: 0,
            ok: false,
            duration: Duration::ZERO,
        };
        sink.on_query(&stats);
        sink.on_query_phases(&stats, &QueryPhases::default());
        sink.on_auth(&AuthStats {
            functions: vec!["test.ping".to_string()],
            allowed: false,
            expanded: false,
            duration: Duration::ZERO,
        });
    }

    #[test]
    fn test_millis() {
        assert!((millis(Duration::from_micros(1500)) - 1.5).abs() < 1e-9);
    }
}
