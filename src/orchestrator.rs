//! Run lifecycle: setup, execute, evaluate.
//!
//! ```text
//! setup()  -> resolve every test identity once, build per-user contexts
//! run()    -> drive the profile with a fresh MetricSink, return its snapshot
//! report() -> evaluate thresholds and advisories into a RunReport
//! ```
//!
//! An [`Orchestrator`] can be reused for several runs; every [`Orchestrator::run`]
//! records into its own sink, so runs never see each other's samples.

use std::sync::Arc;
use typed_builder::TypedBuilder;

use crate::{
    auth::{resolve_identities, Credential, Identity, OidcTokenProvider, TokenProvider},
    config::Settings,
    error::Result,
    executor::{ExecutionStats, StopSignal, UserExecutor, Workload},
    profile::LoadProfile,
    report::RunReport,
    scenario::{Pacer, TokioPacer, WorkloadScenario},
    sink::{MetricSink, Snapshot},
    step::RequestContext,
    threshold::{Advisory, ThresholdRule},
    transport::{HttpTransport, Transport},
};

/// Everything a finished run produced, before evaluation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub profile: String,
    pub snapshot: Snapshot,
    pub stats: ExecutionStats,
    /// Peak target of the profile, for comparison with what was actually reached.
    pub configured_max_users: u32,
}

#[derive(TypedBuilder)]
pub struct Orchestrator {
    #[builder(setter(into))]
    base_url: String,
    #[builder(default)]
    credentials: Vec<Credential>,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    #[builder(default = Arc::new(TokioPacer) as Arc<dyn Pacer>)]
    pacer: Arc<dyn Pacer>,
    #[builder(default)]
    executor: UserExecutor,
    #[builder(default)]
    stop: StopSignal,
    #[builder(default, setter(skip))]
    identities: Vec<Identity>,
}

impl Orchestrator {
    /// Wire the real HTTP transport and OIDC token provider from `settings`.
    ///
    /// Both share one `reqwest::Client`, built with the configured request timeout.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = HttpTransport::client(settings.request_timeout)?;

        Ok(Self::builder()
            .base_url(settings.api_gateway_url.clone())
            .credentials(settings.test_users.clone())
            .transport(Arc::new(HttpTransport::from_client(client.clone())))
            .tokens(Arc::new(OidcTokenProvider::new(
                client,
                settings.token_url(),
                settings.client_id.clone(),
            )))
            .executor(UserExecutor::builder().seed(settings.seed).build())
            .build())
    }

    /// Resolve every configured credential into an [`Identity`].
    ///
    /// Failures are logged and the identity runs anonymously. Returns the
    /// number of identities that obtained a token.
    pub async fn setup(&mut self) -> usize {
        self.identities = resolve_identities(self.tokens.as_ref(), &self.credentials).await;
        let authenticated = self
            .identities
            .iter()
            .filter(|i| i.is_authenticated())
            .count();
        tracing::info!(
            identities = self.identities.len(),
            authenticated,
            "setup complete"
        );
        if authenticated == 0 && !self.identities.is_empty() {
            tracing::warn!("no identity authenticated, gated steps will be skipped");
        }
        authenticated
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Handle that ends the current run early when stopped.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn contexts(&self) -> Vec<RequestContext> {
        if self.identities.is_empty() {
            return vec![RequestContext::new(self.base_url.clone(), None)];
        }
        self.identities
            .iter()
            .map(|i| RequestContext::new(self.base_url.clone(), i.token.clone()))
            .collect()
    }

    /// Drive `profile` with `scenario` until the profile ends or the stop
    /// signal fires.
    pub async fn run(&self, profile: &LoadProfile, scenario: WorkloadScenario) -> RunOutcome {
        let sink = Arc::new(MetricSink::new());
        let workload = Workload {
            scenario: Arc::new(scenario),
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&sink),
            pacer: Arc::clone(&self.pacer),
            contexts: Arc::from(self.contexts()),
        };

        let stats = self
            .executor
            .exec(profile, workload, self.stop.clone())
            .await;

        RunOutcome {
            profile: profile.name.clone(),
            snapshot: sink.snapshot(),
            stats,
            configured_max_users: profile.max_users(),
        }
    }

    pub fn report(
        &self,
        outcome: &RunOutcome,
        rules: &[ThresholdRule],
        advisories: &[Advisory],
    ) -> RunReport {
        let report = RunReport::new(outcome, rules, advisories);
        tracing::info!(
            profile = %report.profile,
            passed = report.passed(),
            requests = report.total_requests,
            "evaluation complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::tests::CannedTokens,
        metric::Statistic,
        scenario::{Branch, Gate, PauseRange},
        step::{tests::ScriptedTransport, Acceptance, AuthMode, ScenarioStep},
        transport::{HttpOutcome, HTTP_REQS},
    };
    use std::time::Duration;

    fn scenario() -> WorkloadScenario {
        let public = ScenarioStep::builder()
            .name("feed")
            .path("/api/Posts")
            .accept(Acceptance::status(200))
            .rate_metric("feed_ok")
            .build();
        let private = ScenarioStep::builder()
            .name("me")
            .path("/api/Account/me")
            .auth(AuthMode::BearerIfAvailable)
            .accept(Acceptance::status(200))
            .rate_metric("me_ok")
            .build();
        WorkloadScenario::builder()
            .name("mixed")
            .branches(vec![
                Branch::builder()
                    .step(public)
                    .pause(PauseRange::fixed(Duration::from_millis(5)))
                    .build(),
                Branch::builder()
                    .step(private)
                    .gate(Gate::Authenticated)
                    .pause(PauseRange::fixed(Duration::from_millis(5)))
                    .build(),
            ])
            .build()
    }

    fn orchestrator(transport: Arc<ScriptedTransport>, allowed: Vec<&'static str>) -> Orchestrator {
        Orchestrator::builder()
            .base_url("http://gw")
            .credentials(vec![
                Credential::new("alice", "pw"),
                Credential::new("bob", "pw"),
            ])
            .transport(transport)
            .tokens(Arc::new(CannedTokens { allowed }))
            .executor(
                UserExecutor::builder()
                    .tick(Duration::from_millis(10))
                    .graceful_stop(Duration::from_secs(1))
                    .seed(Some(3))
                    .build(),
            )
            .build()
    }

    #[tokio::test]
    async fn unauthenticated_users_skip_gated_steps() {
        let transport = Arc::new(ScriptedTransport::always(HttpOutcome::Status(200)));
        let mut orch = orchestrator(Arc::clone(&transport), vec![]);

        assert_eq!(orch.setup().await, 0);
        let outcome = orch
            .run(
                &LoadProfile::constant("flat", 1, Duration::from_millis(50)),
                scenario(),
            )
            .await;

        assert!(outcome.snapshot.get("me_ok").is_none());
        assert_eq!(outcome.snapshot.statistic("feed_ok", Statistic::Rate), Some(1.0));
        assert!(transport
            .requests()
            .iter()
            .all(|r| r.url == "http://gw/api/Posts" && r.bearer.is_none()));
    }

    #[tokio::test]
    async fn authenticated_identity_sends_bearer() {
        let transport = Arc::new(ScriptedTransport::always(HttpOutcome::Status(200)));
        let mut orch = orchestrator(Arc::clone(&transport), vec!["alice"]);

        assert_eq!(orch.setup().await, 1);
        let outcome = orch
            .run(
                &LoadProfile::constant("flat", 1, Duration::from_millis(50)),
                scenario(),
            )
            .await;

        assert_eq!(outcome.snapshot.statistic("me_ok", Statistic::Rate), Some(1.0));
        assert!(transport
            .requests()
            .iter()
            .any(|r| r.bearer.as_deref() == Some("token-alice")));
    }

    #[tokio::test]
    async fn runs_do_not_share_samples() {
        let transport = Arc::new(ScriptedTransport::always(HttpOutcome::Status(200)));
        let orch = orchestrator(transport, vec![]);
        let profile = LoadProfile::constant("flat", 1, Duration::from_millis(30));

        let first = orch.run(&profile, scenario()).await;
        let second = orch.run(&profile, scenario()).await;

        assert!(!orch.stop_signal().is_stopped());
        assert_eq!(first.stats.users_spawned, 1);
        assert_eq!(second.stats.users_spawned, 1);

        let total = first.snapshot.statistic(HTTP_REQS, Statistic::Count).unwrap()
            + second.snapshot.statistic(HTTP_REQS, Statistic::Count).unwrap();
        let mut merged = first.snapshot.clone();
        merged.merge(second.snapshot);
        assert_eq!(merged.statistic(HTTP_REQS, Statistic::Count), Some(total));
    }

    #[test]
    fn builds_from_default_settings() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let orch = Orchestrator::from_settings(&settings).unwrap();
        assert_eq!(orch.base_url, "http://apiGateway:5000");
        assert_eq!(orch.credentials.len(), 5);
        assert!(orch.identities().is_empty());
    }

    #[tokio::test]
    async fn stop_before_run_produces_empty_outcome() {
        let transport = Arc::new(ScriptedTransport::always(HttpOutcome::Status(200)));
        let orch = orchestrator(transport, vec![]);
        orch.stop_signal().stop();

        let outcome = orch
            .run(&LoadProfile::constant("flat", 2, Duration::from_secs(30)), scenario())
            .await;

        assert_eq!(outcome.stats.users_spawned, 0);
        assert!(outcome.snapshot.is_empty());
        assert_eq!(outcome.configured_max_users, 2);
    }
}
