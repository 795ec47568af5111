//! Run evaluation and presentation.
//!
//! [`RunReport`] turns a finished run into headline figures, threshold outcomes
//! and a verdict. [`Reporter`]s write it out as text or JSON.

use serde::Serialize;
use std::future::Future;

use crate::{
    metric::Statistic,
    orchestrator::RunOutcome,
    preset::ERRORS,
    threshold::{advise, evaluate, Advisory, ThresholdOutcome, ThresholdRule, Verdict},
    transport::{HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED},
};

/// A [`RunReport`] is the processed form of a finished run.
///
/// It derives the headline figures from the run's [`crate::Snapshot`], carries
/// every threshold outcome and the advisories that fired, and settles the
/// verdict. It is pure data: building one performs no I/O, and the same run
/// always produces the same report. Presentation belongs to a [`Reporter`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub profile: String,
    pub p95_duration_ms: Option<f64>,
    pub p99_duration_ms: Option<f64>,
    pub max_duration_ms: Option<f64>,
    /// `errors` when a scenario records it, otherwise `http_req_failed`.
    pub error_rate: Option<f64>,
    pub total_requests: u64,
    pub iterations: u64,
    pub max_active_users: usize,
    pub configured_max_users: u32,
    pub elapsed_secs: f64,
    pub thresholds: Vec<ThresholdOutcome>,
    /// Present only when the run was evaluated with advisories.
    pub recommendations: Option<Vec<String>>,
    pub passed: bool,
}

impl RunReport {
    pub fn new(outcome: &RunOutcome, rules: &[ThresholdRule], advisories: &[Advisory]) -> Self {
        let snap = &outcome.snapshot;
        let thresholds = evaluate(rules, snap);
        let passed = thresholds.iter().all(|o| o.verdict != Verdict::Fail);

        Self {
            profile: outcome.profile.clone(),
            p95_duration_ms: snap.statistic(HTTP_REQ_DURATION, Statistic::Percentile(95.0)),
            p99_duration_ms: snap.statistic(HTTP_REQ_DURATION, Statistic::Percentile(99.0)),
            max_duration_ms: snap.statistic(HTTP_REQ_DURATION, Statistic::Max),
            error_rate: snap
                .statistic(ERRORS, Statistic::Rate)
                .or_else(|| snap.statistic(HTTP_REQ_FAILED, Statistic::Rate)),
            total_requests: snap
                .statistic(HTTP_REQS, Statistic::Count)
                .map_or(0, |c| c as u64),
            iterations: outcome.stats.iterations,
            max_active_users: outcome.stats.max_active_users,
            configured_max_users: outcome.configured_max_users,
            elapsed_secs: outcome.stats.elapsed.as_secs_f64(),
            thresholds,
            recommendations: (!advisories.is_empty()).then(|| advise(advisories, snap)),
            passed,
        }
    }

    /// True iff no determinate threshold failed.
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let breaking_point = self.recommendations.is_some();
        let heading = if breaking_point { "RESULTS" } else { "SUMMARY" };
        let banner = format!(
            "========== {} TEST {heading} ==========",
            self.profile.to_uppercase()
        );

        let mut lines = vec![String::new(), banner.clone(), String::new()];
        if breaking_point {
            lines.push("--- Breaking Point Analysis ---".to_owned());
            lines.push(format!(
                "Max users reached: {} (profile peak {})",
                self.max_active_users, self.configured_max_users
            ));
        }
        lines.push(format!("P95 response time: {}", ms(self.p95_duration_ms)));
        lines.push(format!("P99 response time: {}", ms(self.p99_duration_ms)));
        if breaking_point {
            lines.push(format!("Max response time: {}", ms(self.max_duration_ms)));
        }
        lines.push(format!("Error rate: {}", percent(self.error_rate)));
        lines.push(format!("Total requests: {}", self.total_requests));
        lines.push(format!("Iterations: {}", self.iterations));
        if !breaking_point {
            lines.push(format!("Max users: {}", self.max_active_users));
        }
        lines.push(format!("Duration: {:.1}s", self.elapsed_secs));

        lines.push(String::new());
        lines.push("--- Thresholds ---".to_owned());
        lines.extend(self.thresholds.iter().map(|t| {
            let (tag, observed) = match (t.verdict, t.observed) {
                (Verdict::Pass, Some(v)) => ("PASS", format!("{v:.2}")),
                (Verdict::Fail, Some(v)) => ("FAIL", format!("{v:.2}")),
                _ => ("N/A ", "no data".to_owned()),
            };
            format!("{tag}  {} (observed {observed})", t.rule)
        }));

        if let Some(recommendations) = &self.recommendations {
            lines.push(String::new());
            lines.push("--- Recommendations ---".to_owned());
            if recommendations.is_empty() {
                lines.push("(none)".to_owned());
            }
            lines.extend(recommendations.iter().map(|r| format!("! {r}")));
        }

        let verdict = if self.passed { "PASS" } else { "FAIL" };
        lines.push(String::new());
        lines.push(format!("Result: {verdict}"));
        lines.push("=".repeat(banner.chars().count()));

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn ms(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.2}ms"))
}

fn percent(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_owned(), |v| format!("{:.2}%", v * 100.0))
}

/// A [`Reporter`] consumes a [`RunReport`] and performs side effects: printing
/// it, writing it somewhere, or shipping it to another system.
///
/// Reporters are the I/O boundary. Everything upstream (snapshot → evaluation
/// → report) stays pure and deterministic.
pub trait Reporter {
    fn report(
        &self,
        report: &RunReport,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error>>>;
}

/// Prints [`RunReport::render_text`] to stdout.
pub struct TextReporter;

impl Reporter for TextReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", report.render_text());
        Ok(())
    }
}

/// Prints the report as pretty JSON to stdout.
pub struct JsonReporter;

impl Reporter for JsonReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{executor::ExecutionStats, sink::MetricSink};
    use std::time::Duration;

    fn outcome(sink: &MetricSink, profile: &str) -> RunOutcome {
        RunOutcome {
            profile: profile.into(),
            snapshot: sink.snapshot(),
            stats: ExecutionStats {
                max_active_users: 7,
                users_spawned: 7,
                iterations: 12,
                elapsed: Duration::from_secs(3),
            },
            configured_max_users: 10,
        }
    }

    fn healthy_sink() -> MetricSink {
        let sink = MetricSink::new();
        for v in 1..=100 {
            sink.record_counter(HTTP_REQS);
            sink.record_trend(HTTP_REQ_DURATION, f64::from(v));
            sink.record_rate(HTTP_REQ_FAILED, false);
            sink.record_rate(ERRORS, false);
        }
        sink
    }

    #[test]
    fn headline_figures() {
        let report = RunReport::new(&outcome(&healthy_sink(), "load"), &[], &[]);
        assert_eq!(report.total_requests, 100);
        assert_eq!(report.error_rate, Some(0.0));
        assert_eq!(report.max_duration_ms, Some(100.0));
        assert!((report.p95_duration_ms.unwrap() - 95.05).abs() < 1e-9);
        assert_eq!(report.iterations, 12);
        assert!(report.passed());
    }

    #[test]
    fn error_rate_falls_back_to_http_failures() {
        let sink = MetricSink::new();
        sink.record_rate(HTTP_REQ_FAILED, true);
        sink.record_rate(HTTP_REQ_FAILED, false);
        let report = RunReport::new(&outcome(&sink, "smoke"), &[], &[]);
        assert_eq!(report.error_rate, Some(0.5));
    }

    #[test]
    fn indeterminate_rules_do_not_fail_the_run() {
        let rules = [
            ThresholdRule::new(HTTP_REQ_DURATION, "p(95)<500").unwrap(),
            ThresholdRule::new("post_creation_time", "p(95)<800").unwrap(),
        ];
        let report = RunReport::new(&outcome(&healthy_sink(), "load"), &rules, &[]);
        assert!(report.passed());

        let text = report.render_text();
        assert!(text.contains("LOAD TEST SUMMARY"));
        assert!(text.contains("PASS  http_req_duration p(95)<500 (observed 95.05)"));
        assert!(text.contains("N/A   post_creation_time p(95)<800 (observed no data)"));
        assert!(text.contains("Result: PASS"));
    }

    #[test]
    fn summary_layout() {
        let report = RunReport::new(&outcome(&healthy_sink(), "load"), &[], &[]);
        let banner = "========== LOAD TEST SUMMARY ==========";
        let closing = "=".repeat(banner.len());
        let expected = [
            "",
            banner,
            "",
            "P95 response time: 95.05ms",
            "P99 response time: 99.01ms",
            "Error rate: 0.00%",
            "Total requests: 100",
            "Iterations: 12",
            "Max users: 7",
            "Duration: 3.0s",
            "",
            "--- Thresholds ---",
            "",
            "Result: PASS",
            closing.as_str(),
            "",
        ]
        .join("\n");
        assert_eq!(report.render_text(), expected);
    }

    #[test]
    fn failing_rule_fails_report() {
        let rules = [ThresholdRule::new(HTTP_REQ_DURATION, "max<50").unwrap()];
        let report = RunReport::new(&outcome(&healthy_sink(), "load"), &rules, &[]);
        assert!(!report.passed());
        assert!(report.render_text().contains("Result: FAIL"));
    }

    #[test]
    fn stress_report_has_breaking_point_and_recommendations() {
        let advisories = [
            Advisory::new(
                "handled well",
                vec![ThresholdRule::new(ERRORS, "rate<0.01").unwrap()],
            ),
            Advisory::new(
                "under stress",
                vec![ThresholdRule::new(ERRORS, "rate>0.05").unwrap()],
            ),
        ];
        let report = RunReport::new(&outcome(&healthy_sink(), "stress"), &[], &advisories);
        assert_eq!(report.recommendations, Some(vec!["handled well".to_owned()]));

        let text = report.render_text();
        assert!(text.contains("STRESS TEST RESULTS"));
        assert!(text.contains("Max users reached: 7 (profile peak 10)"));
        assert!(text.contains("Max response time: 100.00ms"));
        assert!(text.contains("! handled well"));
        assert!(!text.contains("under stress"));
    }

    #[test]
    fn json_shape() {
        let report = RunReport::new(&outcome(&healthy_sink(), "load"), &[], &[]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["total_requests"], 100);
        assert_eq!(value["passed"], true);
        assert!(value["recommendations"].is_null());
    }
}
