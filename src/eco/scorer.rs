//! Behavior scorer
//!
//! Owns the per-trip [`EcoAccumulator`] and the previous-tick cursor needed to
//! derive acceleration and lateral G. Reports are projected on demand.

use crate::config::EcoPolicy;
use crate::eco::accumulator::EcoAccumulator;
use crate::eco::scoring::{
    compute_eco_score, compute_fatigue_risk, compute_smoothness_score, discipline_fraction,
    optimal_fraction, DrivingClock,
};
use crate::eco::types::{EcoReport, EcoSnapshot};
use crate::types::{normalize_heading_delta, round_to, MS_TO_KMH};
use chrono::{DateTime, TimeZone, Timelike};
use log::debug;

/// Standard gravity (m/s²)
const GRAVITY_MS2: f64 = 9.81;

/// State carried from one tick to the next
#[derive(Debug, Clone, Default)]
struct TickCursor {
    prev_speed_kmh: Option<f64>,
    prev_timestamp: Option<i64>,
    prev_heading: Option<f64>,
    in_hard_corner: bool,
    /// Timestamp of the last idle tick while an idle period is open
    idle_since: Option<i64>,
}

/// Eco engine: accumulates driving statistics and projects [`EcoReport`]s
#[derive(Debug, Clone)]
pub struct BehaviorScorer {
    policy: EcoPolicy,
    acc: EcoAccumulator,
    cursor: TickCursor,
    start_ms: Option<i64>,
    tracking: bool,
}

impl Default for BehaviorScorer {
    fn default() -> Self {
        Self::new(EcoPolicy::default())
    }
}

impl BehaviorScorer {
    pub fn new(policy: EcoPolicy) -> Self {
        Self {
            policy,
            acc: EcoAccumulator::default(),
            cursor: TickCursor::default(),
            start_ms: None,
            tracking: false,
        }
    }

    /// Clear all statistics and begin accepting ticks
    pub fn start(&mut self, now_ms: i64) {
        self.acc = EcoAccumulator::default();
        self.cursor = TickCursor::default();
        self.start_ms = Some(now_ms);
        self.tracking = true;
    }

    /// Stop accepting ticks. The accumulated statistics remain reportable.
    pub fn stop(&mut self) {
        self.tracking = false;
    }

    /// Clear all statistics without tracking
    pub fn reset(&mut self) {
        self.acc = EcoAccumulator::default();
        self.cursor = TickCursor::default();
        self.start_ms = None;
        self.tracking = false;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn accumulator(&self) -> &EcoAccumulator {
        &self.acc
    }

    /// Fold one tick into the statistics
    pub fn tick(
        &mut self,
        speed_kmh: f64,
        speed_limit_kmh: Option<f64>,
        timestamp_ms: i64,
        heading: Option<f64>,
    ) {
        if !self.tracking {
            return;
        }

        self.acc
            .record_speed(speed_kmh, self.policy.fatigue.recent_samples);

        if let Some(h) = heading {
            self.track_cornering(speed_kmh, h, timestamp_ms);
            self.cursor.prev_heading = Some(h);
        }

        self.acc
            .record_compliance(speed_kmh, speed_limit_kmh, &self.policy);

        self.track_idle(speed_kmh, timestamp_ms);

        if let (Some(prev_speed), Some(dt)) = (self.cursor.prev_speed_kmh, self.interval_s(timestamp_ms)) {
            let accel = (speed_kmh - prev_speed) / MS_TO_KMH / dt;
            self.acc.record_acceleration(accel, &self.policy);
        }

        self.cursor.prev_speed_kmh = Some(speed_kmh);
        self.cursor.prev_timestamp = Some(timestamp_ms);
    }

    /// Seconds since the previous tick, if usable for a derivative
    fn interval_s(&self, timestamp_ms: i64) -> Option<f64> {
        let prev = self.cursor.prev_timestamp?;
        let dt = timestamp_ms.saturating_sub(prev) as f64 / 1000.0;
        (dt > 0.0 && dt < self.policy.max_interval_s).then_some(dt)
    }

    fn track_cornering(&mut self, speed_kmh: f64, heading: f64, timestamp_ms: i64) {
        let Some(prev_heading) = self.cursor.prev_heading else {
            return;
        };
        if speed_kmh <= self.policy.corner_min_speed_kmh {
            return;
        }
        let Some(dt) = self.interval_s(timestamp_ms) else {
            return;
        };

        let delta = normalize_heading_delta(heading - prev_heading);
        let heading_rate = delta.abs().to_radians() / dt;
        let lateral_g = speed_kmh / MS_TO_KMH * heading_rate / GRAVITY_MS2;

        if lateral_g <= self.policy.lateral_g_noise_floor {
            self.cursor.in_hard_corner = false;
            return;
        }

        self.acc.record_lateral_g(lateral_g);
        if lateral_g > self.policy.hard_corner_g {
            if !self.cursor.in_hard_corner {
                self.acc.hard_corners += 1;
                self.cursor.in_hard_corner = true;
                debug!("hard corner #{} at {:.2} G", self.acc.hard_corners, lateral_g);
            }
        } else {
            self.cursor.in_hard_corner = false;
        }
    }

    fn track_idle(&mut self, speed_kmh: f64, timestamp_ms: i64) {
        if speed_kmh >= self.policy.idle_speed_kmh {
            self.cursor.idle_since = None;
            return;
        }
        match self.cursor.idle_since {
            None => {
                self.acc.idle_periods += 1;
            }
            Some(last) if timestamp_ms > last => {
                self.acc.idle_time_s += timestamp_ms.saturating_sub(last) as f64 / 1000.0;
            }
            Some(_) => {}
        }
        self.cursor.idle_since = Some(timestamp_ms);
    }

    /// Project the accumulated statistics into a report.
    ///
    /// Driving duration is measured up to `now`; the fatigue time-of-day terms
    /// use the hour of `now` in its own time zone.
    pub fn report<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> EcoReport {
        let acc = &self.acc;
        let elapsed_ms = self
            .start_ms
            .map(|start| now.timestamp_millis().saturating_sub(start))
            .unwrap_or(0);
        let elapsed_s = elapsed_ms as f64 / 1000.0;
        let idle_ratio = if elapsed_s > 0.0 {
            acc.idle_time_s / elapsed_s
        } else {
            0.0
        };
        let clock = DrivingClock {
            driving_min: elapsed_ms as f64 / 60_000.0,
            local_hour: now.hour(),
        };

        EcoReport {
            eco_score: compute_eco_score(acc, &self.policy, idle_ratio),
            smoothness_score: compute_smoothness_score(acc, &self.policy),
            fatigue_risk_score: compute_fatigue_risk(acc, &self.policy.fatigue, clock),
            harsh_accelerations: acc.harsh_accelerations,
            harsh_brakes: acc.harsh_brakes,
            hard_corners: acc.hard_corners,
            total_accelerations: acc.total_accelerations,
            total_brakes: acc.total_brakes,
            idle_time_s: acc.idle_time_s,
            idle_periods: acc.idle_periods,
            speed_discipline_pct: (discipline_fraction(acc) * 100.0).round() as u32,
            optimal_speed_pct: (optimal_fraction(acc) * 100.0).round() as u32,
            avg_acceleration: round_to(acc.acceleration.mean(), 2),
            avg_deceleration: round_to(acc.deceleration.mean(), 2),
            avg_lateral_g: round_to(acc.lateral_g.mean(), 2),
            max_lateral_g: round_to(acc.max_lateral_g, 2),
            coast_down_events: acc.coast_down_events,
            speed_variance: round_to(acc.speed.variance(), 1),
        }
    }

    /// The subset of the report stored with a finished trip
    pub fn snapshot<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> EcoSnapshot {
        EcoSnapshot::from(&self.report(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    /// Noon UTC on an arbitrary day, outside every time-of-day fatigue band
    const NOON: i64 = 1_767_268_800_000;

    fn started() -> BehaviorScorer {
        let mut scorer = BehaviorScorer::default();
        scorer.start(NOON);
        scorer
    }

    #[test]
    fn test_ticks_ignored_until_started() {
        let mut scorer = BehaviorScorer::default();
        scorer.tick(50.0, None, NOON, None);
        assert_eq!(scorer.accumulator().tick_count, 0);
    }

    #[test]
    fn test_harsh_acceleration() {
        let mut scorer = started();
        scorer.tick(0.0, None, NOON, None);
        scorer.tick(36.0, None, NOON + 1_000, None);

        let report = scorer.report(&at(NOON + 2_000));
        assert_eq!(report.total_accelerations, 1);
        assert_eq!(report.harsh_accelerations, 1);
        assert_relative_eq!(report.avg_acceleration, 10.0);
    }

    #[test]
    fn test_coast_down() {
        let mut scorer = started();
        scorer.tick(36.0, None, NOON, None);
        scorer.tick(34.2, None, NOON + 1_000, None);

        let report = scorer.report(&at(NOON + 1_000));
        assert_eq!(report.total_brakes, 1);
        assert_eq!(report.coast_down_events, 1);
        assert_eq!(report.harsh_brakes, 0);
        assert_relative_eq!(report.avg_deceleration, 0.5);
    }

    #[test]
    fn test_gap_skips_derivative() {
        let mut scorer = started();
        scorer.tick(0.0, None, NOON, None);
        scorer.tick(36.0, None, NOON + 10_000, None);
        // Out-of-order timestamp is skipped too
        scorer.tick(72.0, None, NOON + 9_000, None);

        let report = scorer.report(&at(NOON + 10_000));
        assert_eq!(report.total_accelerations, 0);
        assert_eq!(report.total_brakes, 0);
    }

    #[test]
    fn test_idle_periods_and_time() {
        let mut scorer = started();
        scorer.tick(0.0, None, NOON, None);
        scorer.tick(1.0, None, NOON + 1_000, None);
        scorer.tick(0.0, None, NOON + 3_000, None);
        scorer.tick(20.0, None, NOON + 4_000, None);
        scorer.tick(0.0, None, NOON + 5_000, None);

        let report = scorer.report(&at(NOON + 6_000));
        assert_eq!(report.idle_periods, 2);
        assert_relative_eq!(report.idle_time_s, 3.0);
    }

    #[test]
    fn test_hard_corner_counted_once_per_excursion() {
        let mut scorer = started();
        // 10 m/s turning 30°/s is about 0.53 G
        scorer.tick(36.0, None, NOON, Some(0.0));
        scorer.tick(36.0, None, NOON + 1_000, Some(30.0));
        scorer.tick(36.0, None, NOON + 2_000, Some(60.0));
        assert_eq!(scorer.accumulator().hard_corners, 1);

        // Straight line releases the latch
        scorer.tick(36.0, None, NOON + 3_000, Some(60.0));
        scorer.tick(36.0, None, NOON + 4_000, Some(90.0));

        let report = scorer.report(&at(NOON + 4_000));
        assert_eq!(report.hard_corners, 2);
        assert_relative_eq!(report.max_lateral_g, 0.53);
        assert_relative_eq!(report.avg_lateral_g, 0.53);
    }

    #[test]
    fn test_heading_wraparound() {
        let mut scorer = started();
        scorer.tick(36.0, None, NOON, Some(350.0));
        scorer.tick(36.0, None, NOON + 1_000, Some(10.0));
        // 20° rather than 340°: 10 m/s × 0.349 rad/s ≈ 0.36 G
        let report = scorer.report(&at(NOON + 1_000));
        assert_relative_eq!(report.max_lateral_g, 0.36);
    }

    #[test]
    fn test_no_cornering_at_low_speed() {
        let mut scorer = started();
        scorer.tick(4.0, None, NOON, Some(0.0));
        scorer.tick(4.0, None, NOON + 1_000, Some(90.0));
        assert_eq!(scorer.accumulator().lateral_g.count(), 0);
    }

    #[test]
    fn test_discipline_and_optimal_percentages() {
        let mut scorer = started();
        scorer.tick(60.0, Some(50.0), NOON, None);
        scorer.tick(45.0, Some(50.0), NOON + 1_000, None);
        scorer.tick(70.0, None, NOON + 2_000, None);
        scorer.tick(100.0, Some(120.0), NOON + 3_000, None);

        let report = scorer.report(&at(NOON + 4_000));
        assert_eq!(report.speed_discipline_pct, 75);
        assert_eq!(report.optimal_speed_pct, 50);
    }

    #[test]
    fn test_report_is_idempotent() {
        let mut scorer = started();
        for (i, speed) in [0.0, 20.0, 45.0, 30.0, 60.0].iter().enumerate() {
            scorer.tick(*speed, Some(50.0), NOON + i as i64 * 1_000, Some(i as f64 * 10.0));
        }
        let now = at(NOON + 5_000);
        assert_eq!(scorer.report(&now), scorer.report(&now));
    }

    #[test]
    fn test_steady_drive_scores_full() {
        let mut scorer = started();
        for i in 0..60 {
            scorer.tick(70.0, Some(100.0), NOON + i * 1_000, Some(90.0));
        }
        let report = scorer.report(&at(NOON + 60_000));
        assert_eq!(report.eco_score, 100);
        assert_eq!(report.smoothness_score, 100);
        assert_eq!(report.fatigue_risk_score, 0);
        assert_eq!(report.speed_variance, 0.0);
    }

    #[test]
    fn test_fatigue_from_clock() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 23, 30, 0).unwrap();
        let mut scorer = BehaviorScorer::default();
        scorer.start(now.timestamp_millis() - 150 * 60_000);

        assert_eq!(scorer.report(&now).fatigue_risk_score, 53);
    }

    #[test]
    fn test_stop_freezes_statistics() {
        let mut scorer = started();
        scorer.tick(0.0, None, NOON, None);
        scorer.stop();
        scorer.tick(50.0, None, NOON + 1_000, None);

        assert!(!scorer.is_tracking());
        assert_eq!(scorer.accumulator().tick_count, 1);

        scorer.reset();
        assert_eq!(scorer.accumulator().tick_count, 0);
    }

    #[test]
    fn test_snapshot_matches_report() {
        let mut scorer = started();
        scorer.tick(0.0, None, NOON, None);
        scorer.tick(36.0, None, NOON + 1_000, None);
        let now = at(NOON + 1_000);

        let snapshot = scorer.snapshot(&now);
        let report = scorer.report(&now);
        assert_eq!(snapshot.eco_score, report.eco_score);
        assert_eq!(snapshot.harsh_accelerations, 1);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut scorer = started();
        scorer.tick(0.0, None, NOON, None);
        scorer.tick(0.0, None, i64::MIN, Some(0.0));
        scorer.tick(40.0, None, i64::MAX, Some(90.0));

        let acc = scorer.accumulator();
        assert_eq!(acc.tick_count, 3);
        assert_eq!(acc.total_accelerations, 0);
        assert_eq!(acc.hard_corners, 0);
        assert_eq!(acc.idle_periods, 1);
    }
}
