//! A single measured call against the target API.
//!
//! A [`ScenarioStep`] is data: what to request, which outcomes count as
//! acceptable and where to record the result. Classification lives in the
//! [`Acceptance`] table, so it can be checked with synthetic outcomes without a
//! network.

use rand::Rng;
use reqwest::Method;
use std::{
    ops::RangeInclusive,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use typed_builder::TypedBuilder;

use crate::{
    sink::MetricSink,
    transport::{as_millis_f64, record_http_metrics, HttpOutcome, HttpRequest, Transport},
};

/// One acceptance predicate over an [`HttpOutcome`].
#[derive(Debug, Clone, PartialEq)]
pub enum Accept {
    Status(u16),
    StatusIn(Vec<u16>),
    StatusRange(RangeInclusive<u16>),
}

impl Accept {
    fn matches(&self, status: u16) -> bool {
        match self {
            Accept::Status(code) => *code == status,
            Accept::StatusIn(codes) => codes.contains(&status),
            Accept::StatusRange(range) => range.contains(&status),
        }
    }
}

/// An outcome is accepted when any predicate matches its status.
/// Timeouts and transport failures are never accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Acceptance {
    predicates: Vec<Accept>,
}

impl Acceptance {
    pub fn status(code: u16) -> Self {
        Self {
            predicates: vec![Accept::Status(code)],
        }
    }

    pub fn any_of(codes: &[u16]) -> Self {
        Self {
            predicates: vec![Accept::StatusIn(codes.to_vec())],
        }
    }

    pub fn or(mut self, predicate: Accept) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn accepts(&self, outcome: &HttpOutcome) -> bool {
        outcome
            .status()
            .is_some_and(|status| self.predicates.iter().any(|p| p.matches(status)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSpec {
    Fixed(String),
    /// `{prefix}{id}` with `id` drawn uniformly from `ids`.
    RandomId {
        prefix: String,
        ids: RangeInclusive<u32>,
    },
}

impl PathSpec {
    pub fn random_id(prefix: impl Into<String>, ids: RangeInclusive<u32>) -> Self {
        PathSpec::RandomId {
            prefix: prefix.into(),
            ids,
        }
    }

    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            PathSpec::Fixed(path) => path.clone(),
            PathSpec::RandomId { prefix, ids } => {
                format!("{prefix}{}", rng.gen_range(ids.clone()))
            }
        }
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        PathSpec::Fixed(path.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepBody {
    Json(serde_json::Value),
    /// `{"caption": "<prefix> <epoch-ms>"}`
    Caption { prefix: String },
}

impl StepBody {
    fn render(&self) -> serde_json::Value {
        match self {
            StepBody::Json(value) => value.clone(),
            StepBody::Caption { prefix } => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis();
                serde_json::json!({ "caption": format!("{prefix} {now}") })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    Anonymous,
    /// Send the identity's bearer token when it has one, otherwise go anonymous.
    BearerIfAvailable,
}

/// What a `true` in the step's rate metric means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateSense {
    #[default]
    Success,
    Failure,
}

/// Per-user request context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub base_url: String,
    pub bearer: Option<String>,
}

impl RequestContext {
    pub fn new(base_url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ScenarioStep {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default = Method::GET)]
    pub method: Method,
    #[builder(setter(into))]
    pub path: PathSpec,
    #[builder(default, setter(strip_option))]
    pub body: Option<StepBody>,
    #[builder(default)]
    pub auth: AuthMode,
    pub accept: Acceptance,
    #[builder(setter(into))]
    pub rate_metric: String,
    #[builder(default)]
    pub rate_sense: RateSense,
    #[builder(default, setter(strip_option, into))]
    pub trend_metric: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub success_counter: Option<String>,
    /// Extra attempts after an unaccepted outcome. Zero means no retry.
    #[builder(default)]
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub accepted: bool,
    pub outcome: HttpOutcome,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl ScenarioStep {
    /// Perform the call and record its result.
    ///
    /// Records exactly one rate sample, at most one trend sample (the last
    /// attempt's latency) and one success counter increment when accepted.
    pub async fn execute<R: Rng + ?Sized>(
        &self,
        ctx: &RequestContext,
        transport: &dyn Transport,
        sink: &MetricSink,
        rng: &mut R,
    ) -> StepResult {
        let request = HttpRequest {
            method: self.method.clone(),
            url: ctx.url(&self.path.render(rng)),
            bearer: match self.auth {
                AuthMode::Anonymous => None,
                AuthMode::BearerIfAvailable => ctx.bearer.clone(),
            },
            body: self.body.as_ref().map(StepBody::render),
        };

        let mut attempts = 0;
        let (outcome, elapsed, accepted) = loop {
            attempts += 1;
            let start = Instant::now();
            let outcome = transport.send(request.clone()).await;
            let elapsed = start.elapsed();
            record_http_metrics(sink, &outcome, elapsed);

            let accepted = self.accept.accepts(&outcome);
            if accepted || attempts > self.retries {
                break (outcome, elapsed, accepted);
            }
            tracing::debug!(step = %self.name, attempt = attempts, ?outcome, "retrying step");
        };

        if !accepted {
            tracing::debug!(
                step = %self.name,
                url = %request.url,
                ?outcome,
                "outcome outside accepted set"
            );
        }

        let hit = match self.rate_sense {
            RateSense::Success => accepted,
            RateSense::Failure => !accepted,
        };
        sink.record_rate(&self.rate_metric, hit);
        if let Some(trend) = &self.trend_metric {
            sink.record_trend(trend, as_millis_f64(elapsed));
        }
        if accepted {
            if let Some(counter) = &self.success_counter {
                sink.record_counter(counter);
            }
        }

        StepResult {
            accepted,
            outcome,
            elapsed,
            attempts,
        }
    }
}
