//! Operator-facing counters.
//!
//! Failures are absorbed before they reach the caller, so these counters
//! (together with the `warn!` logs) are the only place they stay visible.

use crate::types::{BackendKind, Intent};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Classification of an absorbed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Unavailable,
    Malformed,
    QueryExecution,
    Generation,
    EmptyOutput,
    NotConfigured,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Malformed => "malformed",
            FailureKind::QueryExecution => "query_execution",
            FailureKind::Generation => "generation",
            FailureKind::EmptyOutput => "empty_output",
            FailureKind::NotConfigured => "not_configured",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    Backend(BackendKind),
    Classification,
    Synthesis,
    Refinement,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Backend(kind) => write!(f, "backend.{kind}"),
            Component::Classification => f.write_str("classification"),
            Component::Synthesis => f.write_str("synthesis"),
            Component::Refinement => f.write_str("refinement"),
        }
    }
}

#[derive(Default)]
pub struct AssistantMetrics {
    queries: DashMap<Intent, AtomicU64>,
    hits: DashMap<BackendKind, AtomicU64>,
    empties: DashMap<BackendKind, AtomicU64>,
    failures: DashMap<(Component, FailureKind), AtomicU64>,
}

impl AssistantMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, intent: Intent) {
        bump(&self.queries, intent);
    }

    pub fn record_hit(&self, backend: BackendKind) {
        bump(&self.hits, backend);
    }

    pub fn record_empty(&self, backend: BackendKind) {
        bump(&self.empties, backend);
    }

    pub fn record_failure(&self, component: Component, kind: FailureKind) {
        bump(&self.failures, (component, kind));
    }

    pub fn failure_count(&self, component: Component, kind: FailureKind) -> u64 {
        read(&self.failures, &(component, kind))
    }

    pub fn hit_count(&self, backend: BackendKind) -> u64 {
        read(&self.hits, &backend)
    }

    pub fn empty_count(&self, backend: BackendKind) -> u64 {
        read(&self.empties, &backend)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries: collect(&self.queries, |intent| intent.to_string()),
            hits: collect(&self.hits, |backend| backend.to_string()),
            empties: collect(&self.empties, |backend| backend.to_string()),
            failures: collect(&self.failures, |(component, kind)| {
                format!("{component}.{kind}")
            }),
            timestamp: Utc::now(),
        }
    }
}

fn bump<K: Eq + std::hash::Hash>(map: &DashMap<K, AtomicU64>, key: K) {
    map.entry(key).or_default().fetch_add(1, Ordering::Relaxed);
}

fn read<K: Eq + std::hash::Hash>(map: &DashMap<K, AtomicU64>, key: &K) -> u64 {
    map.get(key)
        .map(|counter| counter.load(Ordering::Relaxed))
        .unwrap_or(0)
}

fn collect<K, F>(map: &DashMap<K, AtomicU64>, label: F) -> BTreeMap<String, u64>
where
    K: Eq + std::hash::Hash,
    F: Fn(&K) -> String,
{
    map.iter()
        .map(|entry| (label(entry.key()), entry.value().load(Ordering::Relaxed)))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub queries: BTreeMap<String, u64>,
    pub hits: BTreeMap<String, u64>,
    pub empties: BTreeMap<String, u64>,
    pub failures: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}
