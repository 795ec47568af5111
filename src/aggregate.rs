use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

/// The `Aggregate` trait defines how raw samples are collected and combined into
/// an intermediate, mergeable representation.
///
/// Aggregates store raw data only (counts, totals, observed samples). Derived
/// statistics such as percentiles and ratios are computed later, when a
/// [`crate::Snapshot`] is evaluated or reported, so the same aggregate can feed
/// any statistic a threshold asks for.
///
/// # Implementor notes
/// - `merge` must be **associative** and **commutative**. Simulated users
///   interleave arbitrarily, so the order in which samples or partial aggregates
///   arrive must not change the result.
/// - Recording is append-only. There is no way to retract a sample.
///
/// # Example
/// ```rust
/// use loadgate::Aggregate;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct BytesAggregate {
///     total: u64,
/// }
///
/// impl Aggregate for BytesAggregate {
///     type Sample = u64;
///
///     fn new() -> Self {
///         Self { total: 0 }
///     }
///
///     fn consume(&mut self, sample: &Self::Sample) {
///         self.total += sample;
///     }
///
///     fn merge(&mut self, other: Self) {
///         self.total += other.total;
///     }
/// }
/// ```
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialEq + Send + Sync + Debug + Clone,
{
    /// The raw observation this aggregate accumulates.
    type Sample;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple samples into the current instance.
    ///
    /// This default implementation calls [`Aggregate::consume`] for each sample.
    fn aggregate(&mut self, samples: &[Self::Sample]) {
        samples.iter().for_each(|s| self.consume(s));
    }

    /// Incorporate a single sample into the aggregate.
    fn consume(&mut self, sample: &Self::Sample);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Monotonically increasing count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterAggregate {
    pub count: u64,
}

impl Aggregate for CounterAggregate {
    type Sample = u64;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, sample: &Self::Sample) {
        self.count = self.count.saturating_add(*sample);
    }

    fn merge(&mut self, other: Self) {
        self.count = self.count.saturating_add(other.count);
    }
}

/// Fraction of `true` observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateAggregate {
    pub hits: u64,
    pub total: u64,
}

impl RateAggregate {
    /// `hits / total`, or `None` before anything was recorded.
    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }
}

impl Aggregate for RateAggregate {
    type Sample = bool;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, sample: &Self::Sample) {
        self.total += 1;
        if *sample {
            self.hits += 1;
        }
    }

    fn merge(&mut self, other: Self) {
        self.hits += other.hits;
        self.total += other.total;
    }
}

/// Every observed sample, in milliseconds.
///
/// Samples are kept verbatim so that any percentile can be computed exactly.
/// Their order is irrelevant: statistics sort a copy before reading it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendAggregate {
    pub samples: Vec<f64>,
}

impl Aggregate for TrendAggregate {
    type Sample = f64;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, sample: &Self::Sample) {
        if sample.is_finite() {
            self.samples.push(*sample);
        }
    }

    fn merge(&mut self, mut other: Self) {
        self.samples.append(&mut other.samples);
    }
}
