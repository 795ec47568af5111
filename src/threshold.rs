//! Declarative pass/fail rules evaluated after a run.
//!
//! Rules use the k6 expression syntax: a statistic, a comparison operator and a
//! bound, e.g. `p(95)<500` or `rate<0.01`, attached to a metric name.

use serde::Serialize;
use std::{fmt, str::FromStr};

use crate::{error::ThresholdError, metric::Statistic, sink::Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// `statistic operator bound`, without the metric it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Condition {
    pub stat: Statistic,
    pub op: Comparison,
    pub bound: f64,
}

impl FromStr for Condition {
    type Err = ThresholdError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let parse_err = || ThresholdError::Parse(expr.to_owned());

        // Two-character operators first so `<=` is not read as `<`.
        let (pos, op, width) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(sym, op)| expr.find(sym).map(|pos| (pos, op, sym.len())))
        .ok_or_else(parse_err)?;

        let lhs = expr[..pos].trim();
        let rhs = expr[pos + width..].trim();
        let bound: f64 = rhs.parse().map_err(|_| parse_err())?;
        if !bound.is_finite() {
            return Err(parse_err());
        }

        Ok(Self {
            stat: parse_statistic(lhs, expr)?,
            op,
            bound,
        })
    }
}

fn parse_statistic(token: &str, expr: &str) -> Result<Statistic, ThresholdError> {
    let stat = match token {
        "count" => Statistic::Count,
        "rate" => Statistic::Rate,
        "min" => Statistic::Min,
        "max" => Statistic::Max,
        "avg" => Statistic::Avg,
        "med" => Statistic::Med,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(|| ThresholdError::UnknownStatistic(other.to_owned()))?;
            let p: f64 = inner
                .trim()
                .parse()
                .map_err(|_| ThresholdError::UnknownStatistic(other.to_owned()))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(ThresholdError::PercentileRange(expr.to_owned()));
            }
            Statistic::Percentile(p)
        }
    };
    Ok(stat)
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.stat, self.op.symbol(), self.bound)
    }
}

/// A condition bound to a metric name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub condition: Condition,
}

impl ThresholdRule {
    pub fn new(metric: impl Into<String>, expr: &str) -> Result<Self, ThresholdError> {
        Ok(Self {
            metric: metric.into(),
            condition: expr.parse()?,
        })
    }

    /// The observed value, or `None` if the metric or statistic is unavailable.
    pub fn observe(&self, snapshot: &Snapshot) -> Option<f64> {
        snapshot.statistic(&self.metric, self.condition.stat)
    }
}

impl fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.metric, self.condition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// Nothing was recorded that the rule could be checked against.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub rule: ThresholdRule,
    pub observed: Option<f64>,
    pub verdict: Verdict,
}

/// Check every rule against `snapshot`.
///
/// Pure: the same snapshot always yields the same outcomes, in rule order.
pub fn evaluate(rules: &[ThresholdRule], snapshot: &Snapshot) -> Vec<ThresholdOutcome> {
    rules
        .iter()
        .map(|rule| {
            let observed = rule.observe(snapshot);
            let verdict = match observed {
                None => Verdict::Indeterminate,
                Some(v) if rule.condition.op.holds(v, rule.condition.bound) => Verdict::Pass,
                Some(_) => Verdict::Fail,
            };
            ThresholdOutcome {
                rule: rule.clone(),
                observed,
                verdict,
            }
        })
        .collect()
}

/// An informational hint shown in reports. It never affects the verdict.
///
/// It fires when every condition resolves and holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub message: String,
    pub when: Vec<ThresholdRule>,
}

impl Advisory {
    pub fn new(message: impl Into<String>, when: Vec<ThresholdRule>) -> Self {
        Self {
            message: message.into(),
            when,
        }
    }

    pub fn fires(&self, snapshot: &Snapshot) -> bool {
        !self.when.is_empty()
            && evaluate(&self.when, snapshot)
                .iter()
                .all(|o| o.verdict == Verdict::Pass)
    }
}

/// Messages of the advisories that fire for `snapshot`, in declaration order.
pub fn advise(advisories: &[Advisory], snapshot: &Snapshot) -> Vec<String> {
    advisories
        .iter()
        .filter(|a| a.fires(snapshot))
        .map(|a| a.message.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MetricSink;

    fn rule(metric: &str, expr: &str) -> ThresholdRule {
        ThresholdRule::new(metric, expr).unwrap()
    }

    #[test]
    fn parses_k6_expressions() {
        let c: Condition = "p(95)<500".parse().unwrap();
        assert_eq!(c.stat, Statistic::Percentile(95.0));
        assert_eq!(c.op, Comparison::Lt);
        assert_eq!(c.bound, 500.0);

        let c: Condition = " rate <= 0.01 ".parse().unwrap();
        assert_eq!((c.stat, c.op, c.bound), (Statistic::Rate, Comparison::Le, 0.01));

        let c: Condition = "count>=10".parse().unwrap();
        assert_eq!((c.stat, c.op), (Statistic::Count, Comparison::Ge));

        let c: Condition = "p(99.9) > 1".parse().unwrap();
        assert_eq!(c.stat, Statistic::Percentile(99.9));
    }

    #[test]
    fn display_round_trips() {
        for expr in ["p(95)<500", "rate<=0.01", "max>2000", "med>=1.5", "count<3"] {
            let c: Condition = expr.parse().unwrap();
            assert_eq!(c.to_string(), expr);
            assert_eq!(c.to_string().parse::<Condition>().unwrap(), c);
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(
            "p95<500".parse::<Condition>(),
            Err(ThresholdError::UnknownStatistic("p95".into()))
        );
        assert_eq!(
            "p(101)<5".parse::<Condition>(),
            Err(ThresholdError::PercentileRange("p(101)<5".into()))
        );
        assert!(matches!("rate 0.01".parse::<Condition>(), Err(ThresholdError::Parse(_))));
        assert!(matches!("rate<abc".parse::<Condition>(), Err(ThresholdError::Parse(_))));
        assert!(matches!("rate<inf".parse::<Condition>(), Err(ThresholdError::Parse(_))));
    }

    #[test]
    fn pass_fail_and_indeterminate() {
        let sink = MetricSink::new();
        for v in [100.0, 200.0, 300.0] {
            sink.record_trend("http_req_duration", v);
        }
        sink.record_rate("errors", false);

        let rules = [
            rule("http_req_duration", "p(95)<500"),
            rule("http_req_duration", "max<250"),
            rule("errors", "rate<0.01"),
            rule("never_recorded", "rate<0.01"),
            rule("errors", "p(95)<1"),
        ];
        let verdicts: Vec<_> = evaluate(&rules, &sink.snapshot())
            .into_iter()
            .map(|o| o.verdict)
            .collect();
        assert_eq!(
            verdicts,
            [
                Verdict::Pass,
                Verdict::Fail,
                Verdict::Pass,
                Verdict::Indeterminate,
                Verdict::Indeterminate,
            ]
        );
    }

    #[test]
    fn evaluation_is_pure() {
        let sink = MetricSink::new();
        sink.record_rate("errors", true);
        sink.record_rate("errors", false);
        let snap = sink.snapshot();
        let rules = [rule("errors", "rate<0.5"), rule("errors", "rate<=0.5")];

        let first = evaluate(&rules, &snap);
        let second = evaluate(&rules, &snap);
        assert_eq!(first, second);
        assert_eq!(first[0].verdict, Verdict::Fail);
        assert_eq!(first[1].verdict, Verdict::Pass);
        assert_eq!(first[0].observed, Some(0.5));
    }

    #[test]
    fn advisories_need_every_condition() {
        let sink = MetricSink::new();
        sink.record_rate("errors", false);
        sink.record_trend("http_req_duration", 100.0);
        let snap = sink.snapshot();

        let healthy = Advisory::new(
            "handled well",
            vec![
                rule("errors", "rate<0.01"),
                rule("http_req_duration", "p(95)<500"),
            ],
        );
        let unresolved = Advisory::new("never", vec![rule("missing", "rate>0.05")]);
        let empty = Advisory::new("empty", vec![]);

        assert_eq!(advise(&[healthy, unresolved, empty], &snap), ["handled well"]);
    }
}
