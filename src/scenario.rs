//! The per-iteration user journey.
//!
//! A [`WorkloadScenario`] is an ordered list of [`Branch`]es. Each iteration walks
//! the list once, front to back: a branch may be skipped by its gate or by its
//! probability draw, a step that fails does not stop the walk, and after every
//! executed step the user pauses for a random think time.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::{
    executor::StopSignal,
    sink::MetricSink,
    step::{RequestContext, ScenarioStep},
    transport::Transport,
};

/// Counter incremented once per completed iteration.
pub const ITERATIONS: &str = "iterations";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Gate {
    #[default]
    Always,
    /// Only for users whose identity resolved to a bearer token.
    Authenticated,
}

/// Uniform think time in `[min, max]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PauseRange {
    pub min: Duration,
    pub max: Duration,
}

impl PauseRange {
    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        Duration::from_secs_f64(rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64()))
    }
}

/// Suspends a simulated user between steps.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Real pacing with `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct Branch {
    pub step: ScenarioStep,
    #[builder(default)]
    pub gate: Gate,
    /// Chance of running once the gate is open. `1.0` makes the branch required.
    #[builder(default = 1.0)]
    pub probability: f64,
    #[builder(default)]
    pub pause: PauseRange,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct WorkloadScenario {
    #[builder(setter(into))]
    pub name: String,
    pub branches: Vec<Branch>,
}

/// Everything an iteration touches besides its own RNG and request context.
#[derive(Clone, Copy)]
pub struct IterationEnv<'a> {
    pub transport: &'a dyn Transport,
    pub sink: &'a MetricSink,
    pub pacer: &'a dyn Pacer,
    pub stop: &'a StopSignal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationSummary {
    pub executed: usize,
    pub accepted: usize,
    pub skipped_by_gate: usize,
    pub skipped_by_chance: usize,
    /// The run stopped before the iteration reached its end.
    pub interrupted: bool,
}

impl WorkloadScenario {
    pub async fn run_iteration<R: Rng + Send>(
        &self,
        ctx: &RequestContext,
        env: IterationEnv<'_>,
        rng: &mut R,
    ) -> IterationSummary {
        let mut summary = IterationSummary::default();

        for branch in &self.branches {
            if env.stop.is_stopped() {
                summary.interrupted = true;
                break;
            }
            if branch.gate == Gate::Authenticated && !ctx.is_authenticated() {
                summary.skipped_by_gate += 1;
                continue;
            }
            if branch.probability < 1.0 && !rng.gen_bool(branch.probability.clamp(0.0, 1.0)) {
                summary.skipped_by_chance += 1;
                continue;
            }

            let result = branch
                .step
                .execute(ctx, env.transport, env.sink, rng)
                .await;
            summary.executed += 1;
            if result.accepted {
                summary.accepted += 1;
            }

            let think = branch.pause.draw(rng);
            tokio::select! {
                _ = env.pacer.pause(think) => {}
                _ = env.stop.stopped() => {
                    summary.interrupted = true;
                    break;
                }
            }
        }

        if !summary.interrupted {
            env.sink.record_counter(ITERATIONS);
        }
        summary
    }
}
