//! Staged concurrency profiles.
//!
//! A [`LoadProfile`] is a starting user count followed by [`Stage`]s. Each stage
//! moves the target linearly from the previous boundary value to its own target
//! over its duration:
//!
//! ```text
//! t = elapsed_in_stage / stage.duration
//! users(t) = previous_target + (stage.target - previous_target) * t
//! ```
//!
//! A stage with `Duration::ZERO` jumps to its target instantly. Past the last
//! stage the target stays at the last stage's value. The fractional target is
//! turned into a whole number of users with [`f64::round`] (half away from zero).

use serde::Serialize;
use std::time::Duration;

/// Ramp to `target` concurrent users over `duration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadProfile {
    pub name: String,
    /// Concurrency at `t = 0`.
    pub start: u32,
    pub stages: Vec<Stage>,
}

impl LoadProfile {
    /// Ramp from zero users through `stages`.
    pub fn ramping(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            start: 0,
            stages,
        }
    }

    /// Flat profile: `users` from the first instant until `duration` elapses.
    pub fn constant(name: impl Into<String>, users: u32, duration: Duration) -> Self {
        Self {
            name: name.into(),
            start: users,
            stages: vec![Stage::new(duration, users)],
        }
    }

    /// Saturates at `Duration::MAX`.
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    /// Highest target the profile ever asks for.
    pub fn max_users(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u32::max)
    }

    /// Target concurrency at `elapsed`, before rounding.
    pub fn concurrency_at(&self, elapsed: Duration) -> f64 {
        let mut from = f64::from(self.start);
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let to = f64::from(stage.target);
            let stage_end = stage_start.saturating_add(stage.duration);
            if elapsed < stage_end {
                let t = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return from + (to - from) * t;
            }
            from = to;
            stage_start = stage_end;
        }
        from
    }

    pub fn users_at(&self, elapsed: Duration) -> usize {
        self.concurrency_at(elapsed).round().max(0.0) as usize
    }

    /// Uniformly compress the stages so the whole profile lasts `total`.
    ///
    /// Targets are kept. Used to shorten presets for quick runs. Stage
    /// durations saturate at `Duration::MAX`.
    pub fn scaled_to(&self, total: Duration) -> Self {
        let current = self.total_duration();
        if current.is_zero() {
            return self.clone();
        }
        let factor = total.as_secs_f64() / current.as_secs_f64();
        Self {
            name: self.name.clone(),
            start: self.start,
            stages: self
                .stages
                .iter()
                .map(|s| Stage::new(scale(s.duration, factor), s.target))
                .collect(),
        }
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn load() -> LoadProfile {
        LoadProfile::ramping(
            "load",
            vec![
                Stage::new(secs(30), 10),
                Stage::new(secs(60), 25),
                Stage::new(secs(120), 50),
                Stage::new(secs(60), 25),
                Stage::new(secs(30), 0),
            ],
        )
    }

    #[test]
    fn interpolates_inside_second_stage() {
        let profile =
            LoadProfile::ramping("p", vec![Stage::new(secs(30), 10), Stage::new(secs(60), 25)]);
        assert_eq!(profile.concurrency_at(secs(45)), 13.75);
        assert_eq!(profile.users_at(secs(45)), 14);
    }

    #[test]
    fn stage_boundaries_hit_targets() {
        let profile = load();
        assert_eq!(profile.concurrency_at(Duration::ZERO), 0.0);
        assert_eq!(profile.concurrency_at(secs(30)), 10.0);
        assert_eq!(profile.concurrency_at(secs(90)), 25.0);
        assert_eq!(profile.concurrency_at(secs(210)), 50.0);
        assert_eq!(profile.concurrency_at(secs(270)), 25.0);
        assert_eq!(profile.concurrency_at(secs(300)), 0.0);
        assert_eq!(profile.concurrency_at(secs(10_000)), 0.0);
    }

    #[test]
    fn continuous_across_boundaries() {
        let profile = load();
        let eps = Duration::from_millis(1);
        for boundary in [30, 90, 210, 270] {
            let before = profile.concurrency_at(secs(boundary) - eps);
            let after = profile.concurrency_at(secs(boundary) + eps);
            assert!((before - after).abs() < 0.01, "jump at {boundary}s");
        }
    }

    #[test]
    fn ramp_down_is_linear() {
        let profile = load();
        assert_eq!(profile.concurrency_at(secs(285)), 12.5);
        assert_eq!(profile.users_at(secs(285)), 13);
    }

    #[test]
    fn zero_length_stage_jumps() {
        let profile = LoadProfile::ramping(
            "spike",
            vec![Stage::new(Duration::ZERO, 40), Stage::new(secs(10), 40)],
        );
        assert_eq!(profile.users_at(Duration::ZERO), 40);
        assert_eq!(profile.users_at(secs(5)), 40);
    }

    #[test]
    fn constant_profile() {
        let smoke = LoadProfile::constant("smoke", 1, secs(30));
        assert_eq!(smoke.users_at(Duration::ZERO), 1);
        assert_eq!(smoke.users_at(secs(29)), 1);
        assert_eq!(smoke.total_duration(), secs(30));
        assert_eq!(smoke.max_users(), 1);
    }

    #[test]
    fn totals_and_maximum() {
        let profile = load();
        assert_eq!(profile.total_duration(), secs(300));
        assert_eq!(profile.max_users(), 50);
    }

    #[test]
    fn scaling_keeps_shape() {
        let scaled = load().scaled_to(secs(30));
        assert!((scaled.total_duration().as_secs_f64() - 30.0).abs() < 1e-6);
        assert_eq!(scaled.max_users(), 50);
        assert!((scaled.concurrency_at(secs(21)) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn huge_durations_saturate() {
        let stretched = load().scaled_to(Duration::MAX);
        assert_eq!(stretched.max_users(), 50);
        assert!(stretched.total_duration() > secs(u64::MAX / 2));
        assert_eq!(stretched.users_at(secs(3600)), 0);

        let forever = LoadProfile::ramping(
            "forever",
            vec![Stage::new(Duration::MAX, 10), Stage::new(secs(60), 20)],
        );
        assert_eq!(forever.total_duration(), Duration::MAX);
        assert_eq!(forever.users_at(Duration::MAX), 20);
    }
}
