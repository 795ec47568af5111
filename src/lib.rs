//! Loadgate: a staged synthetic workload generator for HTTP API gateways,
//! with threshold-based pass/fail gating.
//!
//! A run ramps a population of simulated users up and down along a
//! [`LoadProfile`]. Every user walks a [`WorkloadScenario`] in a loop, every
//! call it makes lands in a shared [`MetricSink`], and at the end the recorded
//! metrics are checked against declarative [`ThresholdRule`]s. The verdict is
//! machine-checkable, so the binary can gate a CI pipeline through its exit code.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`ScenarioStep`]: one measured HTTP call. Knows which statuses are
//!   acceptable and which metrics to record.
//! - [`WorkloadScenario`]: an ordered list of steps, each behind an optional
//!   authentication gate and probability, with think time in between.
//! - [`LoadProfile`]: target concurrency over time as linearly interpolated stages.
//! - [`UserExecutor`]: spawns, parks and drains users so the live population
//!   follows the profile. Responsible for concurrency and shutdown.
//! - [`MetricSink`]: concurrent named counters, rates and trends. Each metric is
//!   an [`Aggregate`] so partial results merge in any order.
//! - [`ThresholdRule`] and [`Advisory`]: conditions over metric statistics, the
//!   first deciding pass/fail, the second only informing.
//! - [`Orchestrator`]: setup (token resolution), run, evaluation.
//! - [`RunReport`]: the evaluated result. [`Reporter`]s print it.
//!
//! Everything that touches the outside world sits behind a trait
//! ([`Transport`], [`TokenProvider`], [`Pacer`], [`Reporter`]), so the whole
//! pipeline can be driven with fakes.
//!
//! # Where to start
//!
//! [`Preset`] bundles a profile, scenario and thresholds for the smoke, load and
//! stress runs. [`Orchestrator::from_settings`] wires the real HTTP stack from
//! [`Settings::from_env`].

/// Mergeable accumulators behind every metric kind
pub mod aggregate;
/// Test identities and bearer tokens
pub mod auth;
/// Environment-driven settings
pub mod config;
pub mod error;
/// Drives a profile with simulated users
pub mod executor;
/// Metric kinds and their statistics
pub mod metric;
/// Run lifecycle
pub mod orchestrator;
/// Built-in smoke, load and stress runs
pub mod preset;
/// Staged concurrency over time
pub mod profile;
/// Evaluated results and reporters
pub mod report;
/// Per-iteration user journeys
pub mod scenario;
/// Shared metric store
pub mod sink;
/// Single measured calls
pub mod step;
/// Threshold parsing and evaluation
pub mod threshold;
/// The HTTP seam
pub mod transport;

pub use aggregate::Aggregate;
pub use auth::{Credential, Identity, OidcTokenProvider, TokenProvider};
pub use config::Settings;
pub use error::{Error, Result};
pub use executor::{ExecutionStats, StopSignal, UserExecutor};
pub use metric::{Metric, MetricKind, Statistic};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use preset::{Preset, PresetKind};
pub use profile::{LoadProfile, Stage};
pub use report::{JsonReporter, Reporter, RunReport, TextReporter};
pub use scenario::{Branch, Gate, Pacer, PauseRange, TokioPacer, WorkloadScenario};
pub use sink::{MetricSink, Snapshot};
pub use step::{Accept, Acceptance, AuthMode, PathSpec, RateSense, ScenarioStep, StepBody};
pub use threshold::{Advisory, ThresholdRule, Verdict};
pub use transport::{HttpOutcome, HttpTransport, Transport};
