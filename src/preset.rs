//! The three run presets: smoke, load and stress.

use reqwest::Method;
use serde::Serialize;
use std::{fmt, str::FromStr, time::Duration};

use crate::{
    error::ThresholdError,
    profile::{LoadProfile, Stage},
    scenario::{Branch, Gate, PauseRange, WorkloadScenario},
    step::{Acceptance, AuthMode, PathSpec, RateSense, ScenarioStep, StepBody},
    threshold::{Advisory, ThresholdRule},
    transport::{HTTP_REQ_DURATION, HTTP_REQ_FAILED},
};

/// Failure rate shared by every step of the load and stress journeys.
pub const ERRORS: &str = "errors";
pub const SUCCESSFUL_REQUESTS: &str = "successful_requests";
pub const FEED_LOAD_TIME: &str = "feed_load_time";
pub const POST_CREATION_TIME: &str = "post_creation_time";
pub const RESPONSE_TIME: &str = "response_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    /// One user, short run, strict thresholds. A pre-flight gate.
    Smoke,
    /// Ramp to expected production concurrency, strict thresholds.
    Load,
    /// Ramp past expected capacity, lenient thresholds, looks for the breaking point.
    Stress,
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetKind::Smoke => f.write_str("smoke"),
            PresetKind::Load => f.write_str("load"),
            PresetKind::Stress => f.write_str("stress"),
        }
    }
}

impl FromStr for PresetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smoke" => Ok(PresetKind::Smoke),
            "load" => Ok(PresetKind::Load),
            "stress" => Ok(PresetKind::Stress),
            other => Err(format!("unknown preset `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Preset {
    pub kind: PresetKind,
    pub profile: LoadProfile,
    pub scenario: WorkloadScenario,
    pub thresholds: Vec<ThresholdRule>,
    pub advisories: Vec<Advisory>,
}

impl Preset {
    /// Fails only if one of the built-in threshold expressions does not parse.
    pub fn new(kind: PresetKind) -> crate::Result<Self> {
        let preset = match kind {
            PresetKind::Smoke => smoke(),
            PresetKind::Load => load(),
            PresetKind::Stress => stress(),
        }?;
        Ok(preset)
    }

    /// Same preset, stages compressed to fit `total`.
    pub fn with_duration(mut self, total: Duration) -> Self {
        self.profile = self.profile.scaled_to(total);
        self
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn smoke() -> Result<Preset, ThresholdError> {
    let posts = ScenarioStep::builder()
        .name("posts endpoint available")
        .path("/api/Posts")
        .accept(Acceptance::status(200))
        .rate_metric("checks")
        .build();
    let single = ScenarioStep::builder()
        .name("single post endpoint works")
        .path("/api/Posts/1")
        .accept(Acceptance::any_of(&[200, 404]))
        .rate_metric("checks")
        .build();

    Ok(Preset {
        kind: PresetKind::Smoke,
        profile: LoadProfile::constant("smoke", 1, secs(30)),
        scenario: WorkloadScenario::builder()
            .name("smoke")
            .branches(vec![
                Branch::builder()
                    .step(posts)
                    .pause(PauseRange::fixed(secs(1)))
                    .build(),
                Branch::builder()
                    .step(single)
                    .pause(PauseRange::fixed(secs(1)))
                    .build(),
            ])
            .build(),
        thresholds: vec![
            ThresholdRule::new(HTTP_REQ_DURATION, "p(99)<1000")?,
            ThresholdRule::new(HTTP_REQ_FAILED, "rate<0.01")?,
        ],
        advisories: vec![],
    })
}

/// A step of the load journey: failure-sense `errors`, success counter.
fn journey_step(name: &str, path: impl Into<PathSpec>, accept: Acceptance) -> ScenarioStep {
    ScenarioStep::builder()
        .name(name)
        .path(path)
        .accept(accept)
        .rate_metric(ERRORS)
        .rate_sense(RateSense::Failure)
        .success_counter(SUCCESSFUL_REQUESTS)
        .build()
}

fn load() -> Result<Preset, ThresholdError> {
    let human = PauseRange::between(secs(1), secs(3));

    let mut feed = journey_step("feed loads", "/api/Posts", Acceptance::status(200));
    feed.trend_metric = Some(FEED_LOAD_TIME.into());

    let mut account = journey_step(
        "account loads",
        "/api/Account/me",
        Acceptance::any_of(&[200, 401]),
    );
    account.auth = AuthMode::BearerIfAvailable;

    let mut create = journey_step("post created", "/api/Posts", Acceptance::any_of(&[201, 200]));
    create.method = Method::POST;
    create.auth = AuthMode::BearerIfAvailable;
    create.body = Some(StepBody::Caption {
        prefix: "loadgate test".into(),
    });
    create.trend_metric = Some(POST_CREATION_TIME.into());

    let single = journey_step(
        "post valid",
        PathSpec::random_id("/api/Posts/", 1..=10),
        Acceptance::any_of(&[200, 404]),
    );

    Ok(Preset {
        kind: PresetKind::Load,
        profile: LoadProfile::ramping(
            "load",
            vec![
                Stage::new(secs(30), 10),
                Stage::new(secs(60), 25),
                Stage::new(secs(120), 50),
                Stage::new(secs(60), 25),
                Stage::new(secs(30), 0),
            ],
        ),
        scenario: WorkloadScenario::builder()
            .name("browse and post")
            .branches(vec![
                Branch::builder().step(feed).pause(human).build(),
                Branch::builder()
                    .step(account)
                    .gate(Gate::Authenticated)
                    .pause(PauseRange::between(millis(500), millis(1500)))
                    .build(),
                Branch::builder()
                    .step(create)
                    .gate(Gate::Authenticated)
                    .probability(0.1)
                    .pause(human)
                    .build(),
                Branch::builder().step(single).pause(human).build(),
            ])
            .build(),
        thresholds: vec![
            ThresholdRule::new(HTTP_REQ_DURATION, "p(95)<500")?,
            ThresholdRule::new(HTTP_REQ_DURATION, "p(99)<1000")?,
            ThresholdRule::new(ERRORS, "rate<0.01")?,
            ThresholdRule::new(FEED_LOAD_TIME, "p(95)<300")?,
            ThresholdRule::new(POST_CREATION_TIME, "p(95)<800")?,
        ],
        advisories: vec![],
    })
}

fn stress() -> Result<Preset, ThresholdError> {
    let mut feed = journey_step("status is 200", "/api/Posts", Acceptance::status(200));
    feed.trend_metric = Some(RESPONSE_TIME.into());
    feed.success_counter = None;

    Ok(Preset {
        kind: PresetKind::Stress,
        profile: LoadProfile::ramping(
            "stress",
            [50, 100, 150, 200, 250, 0]
                .into_iter()
                .map(|target| Stage::new(secs(120), target))
                .collect(),
        ),
        scenario: WorkloadScenario::builder()
            .name("stress browse feed")
            .branches(vec![Branch::builder()
                .step(feed)
                .pause(PauseRange::between(millis(500), millis(1500)))
                .build()])
            .build(),
        thresholds: vec![
            ThresholdRule::new(HTTP_REQ_DURATION, "p(95)<2000")?,
            ThresholdRule::new(ERRORS, "rate<0.10")?,
        ],
        advisories: vec![
            Advisory::new(
                "error rate exceeded 5%, system is under stress",
                vec![ThresholdRule::new(ERRORS, "rate>0.05")?],
            ),
            Advisory::new(
                "p95 latency exceeded 1s, consider scaling or optimization",
                vec![ThresholdRule::new(HTTP_REQ_DURATION, "p(95)>1000")?],
            ),
            Advisory::new(
                "system handled stress well, capacity may be higher than tested",
                vec![
                    ThresholdRule::new(ERRORS, "rate<0.01")?,
                    ThresholdRule::new(HTTP_REQ_DURATION, "p(95)<500")?,
                ],
            ),
        ],
    })
}
