use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aggregate::{CounterAggregate, RateAggregate, TrendAggregate};

/// The three shapes a named metric can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => f.write_str("counter"),
            MetricKind::Rate => f.write_str("rate"),
            MetricKind::Trend => f.write_str("trend"),
        }
    }
}

/// The accumulated state of a single named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Metric {
    Counter(CounterAggregate),
    Rate(RateAggregate),
    Trend(TrendAggregate),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    /// Resolve `stat` against this metric.
    ///
    /// Returns `None` when the statistic does not apply to the metric's kind or
    /// when there is nothing to compute it from (an empty rate or trend).
    pub fn statistic(&self, stat: Statistic) -> Option<f64> {
        match (self, stat) {
            (Metric::Counter(c), Statistic::Count) => Some(c.count as f64),
            (Metric::Counter(_), _) => None,

            (Metric::Rate(r), Statistic::Rate) => r.rate(),
            (Metric::Rate(r), Statistic::Count) => (r.total > 0).then_some(r.total as f64),
            (Metric::Rate(_), _) => None,

            (Metric::Trend(_), Statistic::Rate) => None,
            (Metric::Trend(t), stat) => trend_statistic(&t.samples, stat),
        }
    }
}

fn trend_statistic(samples: &[f64], stat: Statistic) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    match stat {
        Statistic::Count => Some(samples.len() as f64),
        Statistic::Min => samples.iter().copied().min_by(f64::total_cmp),
        Statistic::Max => samples.iter().copied().max_by(f64::total_cmp),
        Statistic::Avg => Some(samples.iter().sum::<f64>() / samples.len() as f64),
        Statistic::Med => percentile(samples, 50.0),
        Statistic::Percentile(p) => percentile(samples, p),
        Statistic::Rate => None,
    }
}

/// Percentile `p` (0..=100) of `samples`.
///
/// With the samples sorted ascending, `rank = p / 100 * (n - 1)` and the value
/// interpolates linearly between `sorted[floor(rank)]` and `sorted[ceil(rank)]`
/// (k6's rule). The result is never below the nearest-rank value
/// `sorted[ceil(p / 100 * n) - 1]`, so at least `p` percent of the samples are
/// at or below it. The input order does not matter.
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let interpolated = sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64);

    let nearest = ((p / 100.0 * n as f64).ceil() as usize).clamp(1, n) - 1;
    Some(interpolated.max(sorted[nearest]))
}

/// A statistic a threshold can select from a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Count,
    Rate,
    Min,
    Max,
    Avg,
    Med,
    /// `p(N)`, with `N` in `0..=100`.
    Percentile(f64),
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Count => f.write_str("count"),
            Statistic::Rate => f.write_str("rate"),
            Statistic::Min => f.write_str("min"),
            Statistic::Max => f.write_str("max"),
            Statistic::Avg => f.write_str("avg"),
            Statistic::Med => f.write_str("med"),
            Statistic::Percentile(p) => write!(f, "p({p})"),
        }
    }
}
