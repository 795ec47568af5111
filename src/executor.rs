//! Executor: drives a [`LoadProfile`] with simulated users.
//!
//! The design separates **concurrency control** (governor loop) from **work
//! execution** (user tasks):
//!
//! 1. The governor ticks every `tick`, evaluates the profile at the elapsed
//!    time and publishes the target user count through a `watch` channel.
//! 2. Whenever the target exceeds the number of users spawned so far, new user
//!    tasks are spawned. User tasks are never respawned, only parked.
//! 3. User `i` runs iterations back to back while `i < target`. On a ramp-down
//!    it finishes its current iteration, then parks until the target rises
//!    again or the run stops.
//! 4. When the profile's duration elapses (or [`StopSignal::stop`] is called
//!    from outside) the run's own stop signal fires. No iteration starts after
//!    that. The caller's signal is never set by a normal end of the profile.
//!    Requests already in flight drain, bounded by `graceful_stop`, after which
//!    the remaining users are aborted.
//!
//! All users share one [`MetricSink`]; nothing is merged at the end.

use futures::future::join_all;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::watch::{self, Receiver, Sender},
    task::JoinHandle,
    time::Instant,
};
use typed_builder::TypedBuilder;

use crate::{
    profile::LoadProfile,
    scenario::{IterationEnv, Pacer, WorkloadScenario},
    sink::MetricSink,
    step::RequestContext,
    transport::Transport,
};

/// Cloneable stop flag. Once stopped it stays stopped.
#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<Sender<bool>>,
    rx: Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`StopSignal::stop`] has been called.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns once stopped.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a user task needs, shared across all of them.
#[derive(Clone)]
pub struct Workload {
    pub scenario: Arc<WorkloadScenario>,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<MetricSink>,
    pub pacer: Arc<dyn Pacer>,
    /// Assigned round-robin: user `i` gets `contexts[i % len]`.
    pub contexts: Arc<[RequestContext]>,
}

impl Workload {
    fn context_for(&self, user: usize) -> RequestContext {
        if self.contexts.is_empty() {
            return RequestContext::default();
        }
        self.contexts[user % self.contexts.len()].clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub max_active_users: usize,
    pub users_spawned: usize,
    pub iterations: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct UserExecutor {
    /// Granularity of governor updates.
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    /// How long in-flight iterations may drain after the stop signal.
    #[builder(default = Duration::from_secs(30))]
    pub graceful_stop: Duration,
    /// Base seed for per-user RNGs. `None` seeds from OS entropy.
    #[builder(default)]
    pub seed: Option<u64>,
}

impl Default for UserExecutor {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    iterations: AtomicU64,
}

impl UserExecutor {
    pub async fn exec(
        &self,
        profile: &LoadProfile,
        workload: Workload,
        stop: StopSignal,
    ) -> ExecutionStats {
        let total = profile.total_duration();
        let (target_tx, target_rx) = watch::channel(0usize);
        let counters = Arc::new(Counters::default());
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        tracing::info!(
            profile = %profile.name,
            scenario = %workload.scenario.name,
            duration = ?total,
            max_users = profile.max_users(),
            "starting run"
        );
        // Users watch a run-local signal; the caller's `stop` is only read.
        let run_stop = StopSignal::new();
        let start = Instant::now();
        let mut next_tick = start;
        let mut last_target = 0;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= total || stop.is_stopped() {
                break;
            }

            let target = profile.users_at(elapsed);
            if target != last_target {
                tracing::debug!(target, elapsed = ?elapsed, "adjusting users");
                last_target = target;
            }
            target_tx.send_replace(target);
            while handles.len() < target {
                handles.push(spawn_user(
                    handles.len(),
                    self.seed,
                    workload.clone(),
                    target_rx.clone(),
                    run_stop.clone(),
                    Arc::clone(&counters),
                ));
            }

            next_tick += self.tick;
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {}
                _ = stop.stopped() => {}
            }
        }

        if stop.is_stopped() {
            tracing::warn!("run aborted before the profile completed");
        }
        run_stop.stop();
        target_tx.send_replace(0);

        tracing::info!(users = handles.len(), "waiting for users to drain");
        let users_spawned = handles.len();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(self.graceful_stop, join_all(handles)).await {
            Ok(results) => {
                for err in results.into_iter().filter_map(Result::err) {
                    tracing::error!("user task panicked: {err}");
                }
            }
            Err(_) => {
                tracing::warn!(
                    grace = ?self.graceful_stop,
                    "users did not drain in time, aborting"
                );
                aborts.iter().for_each(|a| a.abort());
            }
        }

        let stats = ExecutionStats {
            max_active_users: counters.max_active.load(Ordering::Relaxed),
            users_spawned,
            iterations: counters.iterations.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };
        tracing::info!(?stats, "run finished");
        stats
    }
}

fn user_rng(seed: Option<u64>, user: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user as u64)),
        None => StdRng::from_entropy(),
    }
}

fn spawn_user(
    user: usize,
    seed: Option<u64>,
    workload: Workload,
    mut target: Receiver<usize>,
    stop: StopSignal,
    counters: Arc<Counters>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = user_rng(seed, user);
        let ctx = workload.context_for(user);
        let env = IterationEnv {
            transport: workload.transport.as_ref(),
            sink: workload.sink.as_ref(),
            pacer: workload.pacer.as_ref(),
            stop: &stop,
        };
        let mut running = false;
        tracing::debug!(user, authenticated = ctx.is_authenticated(), "user spawned");

        loop {
            if stop.is_stopped() {
                break;
            }
            let current = *target.borrow();
            if user >= current {
                if running {
                    running = false;
                    counters.active.fetch_sub(1, Ordering::Relaxed);
                    tracing::debug!(user, "user parked");
                }
                let woke = async { target.wait_for(|t| user < *t).await.is_ok() };
                tokio::select! {
                    _ = stop.stopped() => break,
                    ok = woke => if !ok { break },
                }
                continue;
            }
            if !running {
                running = true;
                let now = counters.active.fetch_add(1, Ordering::Relaxed) + 1;
                counters.max_active.fetch_max(now, Ordering::Relaxed);
            }

            let summary = workload.scenario.run_iteration(&ctx, env, &mut rng).await;
            if !summary.interrupted {
                counters.iterations.fetch_add(1, Ordering::Relaxed);
            }
        }

        if running {
            counters.active.fetch_sub(1, Ordering::Relaxed);
        }
        tracing::debug!(user, "user shutting down");
    })
}
