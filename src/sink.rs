//! Shared metric registry.
//!
//! Every simulated user records into the same [`MetricSink`]. Metrics register
//! lazily on first use and each one sits behind its own lock, so users touching
//! different metrics never contend and concurrent updates to the same metric are
//! never lost.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use crate::{
    aggregate::{Aggregate, CounterAggregate, RateAggregate, TrendAggregate},
    metric::{Metric, MetricKind, Statistic},
};

#[derive(Debug, Default)]
pub struct MetricSink {
    metrics: RwLock<HashMap<String, Arc<Mutex<Metric>>>>,
    kind_conflicts: Mutex<HashSet<String>>,
}

impl MetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub fn record_counter(&self, name: &str) {
        self.add_counter(name, 1);
    }

    pub fn add_counter(&self, name: &str, n: u64) {
        self.update(name, MetricKind::Counter, |m| {
            if let Metric::Counter(c) = m {
                c.consume(&n);
            }
        });
    }

    pub fn record_rate(&self, name: &str, hit: bool) {
        self.update(name, MetricKind::Rate, |m| {
            if let Metric::Rate(r) = m {
                r.consume(&hit);
            }
        });
    }

    pub fn record_trend(&self, name: &str, value_ms: f64) {
        self.update(name, MetricKind::Trend, |m| {
            if let Metric::Trend(t) = m {
                t.consume(&value_ms);
            }
        });
    }

    /// Immutable copy of everything recorded so far.
    pub fn snapshot(&self) -> Snapshot {
        let metrics = self.metrics.read();
        Snapshot {
            metrics: metrics
                .iter()
                .map(|(name, m)| (name.clone(), m.lock().clone()))
                .collect(),
        }
    }

    fn update(&self, name: &str, kind: MetricKind, f: impl FnOnce(&mut Metric)) {
        let slot = self.slot(name, kind);
        let mut metric = slot.lock();
        if metric.kind() != kind {
            drop(metric);
            self.report_conflict(name, kind);
            return;
        }
        f(&mut *metric);
    }

    fn slot(&self, name: &str, kind: MetricKind) -> Arc<Mutex<Metric>> {
        if let Some(slot) = self.metrics.read().get(name) {
            return Arc::clone(slot);
        }
        let mut metrics = self.metrics.write();
        let slot = metrics.entry(name.to_owned()).or_insert_with(|| {
            tracing::debug!(metric = name, %kind, "registering metric");
            Arc::new(Mutex::new(empty(kind)))
        });
        Arc::clone(slot)
    }

    fn report_conflict(&self, name: &str, attempted: MetricKind) {
        if self.kind_conflicts.lock().insert(name.to_owned()) {
            tracing::warn!(
                metric = name,
                %attempted,
                "metric already registered with a different kind, dropping samples"
            );
        }
    }
}

fn empty(kind: MetricKind) -> Metric {
    match kind {
        MetricKind::Counter => Metric::Counter(CounterAggregate::new()),
        MetricKind::Rate => Metric::Rate(RateAggregate::new()),
        MetricKind::Trend => Metric::Trend(TrendAggregate::new()),
    }
}

/// A frozen view of a [`MetricSink`], keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    metrics: BTreeMap<String, Metric>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    /// Shorthand for resolving `stat` on the metric called `name`.
    pub fn statistic(&self, name: &str, stat: Statistic) -> Option<f64> {
        self.get(name).and_then(|m| m.statistic(stat))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Combine two snapshots. Metrics present in both are merged; when the
    /// kinds disagree the metric from `self` is kept.
    pub fn merge(&mut self, other: Snapshot) {
        for (name, theirs) in other.metrics {
            match self.metrics.get_mut(&name) {
                None => {
                    self.metrics.insert(name, theirs);
                }
                Some(ours) => match (ours, theirs) {
                    (Metric::Counter(a), Metric::Counter(b)) => a.merge(b),
                    (Metric::Rate(a), Metric::Rate(b)) => a.merge(b),
                    (Metric::Trend(a), Metric::Trend(b)) => a.merge(b),
                    _ => tracing::warn!(metric = %name, "kind mismatch while merging snapshots"),
                },
            }
        }
    }
}
