//! Score projection
//!
//! Pure functions turning an [`EcoAccumulator`] into the three composite
//! scores. Nothing here mutates state, so a report can be projected any number
//! of times.

use crate::config::{EcoPolicy, FatiguePolicy};
use crate::eco::accumulator::EcoAccumulator;

/// Inputs to fatigue scoring that come from the clock rather than the accumulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivingClock {
    /// Minutes since tracking started
    pub driving_min: f64,
    /// Local hour of day (0-23)
    pub local_hour: u32,
}

/// Composite eco score (0-100)
pub fn compute_eco_score(acc: &EcoAccumulator, policy: &EcoPolicy, idle_ratio: f64) -> u32 {
    let mut score = 100.0;

    score -= acc.harsh_event_ratio() * policy.harsh_ratio_penalty;
    score -= (idle_ratio * policy.idle_ratio_weight).min(policy.idle_penalty_cap);
    score -= (acc.speed.variance().sqrt() / policy.consistency_divisor).min(policy.consistency_cap);

    // Flat penalties offset by bonuses scaled with the tick fractions
    score = score - policy.discipline_bonus + discipline_fraction(acc) * policy.discipline_bonus;
    score = score - policy.optimal_flat_penalty + optimal_fraction(acc) * policy.optimal_bonus;

    let avg_accel = acc.acceleration.mean();
    if avg_accel > policy.harsh_accel_ms2 {
        score -= ((avg_accel - policy.harsh_accel_ms2) * policy.harsh_avg_accel_rate)
            .min(policy.harsh_avg_accel_cap);
    }

    score -= (acc.hard_corners as f64 * policy.corner_eco_penalty).min(policy.corner_eco_cap);

    clamp_score(score)
}

/// Share of non-harsh longitudinal events, less a cornering penalty (0-100)
pub fn compute_smoothness_score(acc: &EcoAccumulator, policy: &EcoPolicy) -> u32 {
    let smooth_ratio = 1.0 - acc.harsh_event_ratio();
    let corner_penalty = (acc.hard_corners as f64 * policy.corner_smoothness_penalty)
        .min(policy.corner_smoothness_cap);
    clamp_score(smooth_ratio * 100.0 - corner_penalty)
}

/// Drowsiness risk (0-100)
pub fn compute_fatigue_risk(acc: &EcoAccumulator, policy: &FatiguePolicy, clock: DrivingClock) -> u32 {
    let minutes = clock.driving_min;
    let mut risk = 0.0;

    if minutes > policy.long_drive_onset_min {
        risk += ((minutes - policy.long_drive_onset_min) / policy.long_drive_rate_min)
            .min(policy.long_drive_cap);
    }
    if minutes > policy.very_long_drive_onset_min {
        risk += ((minutes - policy.very_long_drive_onset_min) / policy.very_long_drive_rate_min)
            .min(policy.very_long_drive_cap);
    }

    let stdev = acc.speed.variance().sqrt();
    if stdev > policy.erratic_stdev_kmh {
        risk += ((stdev - policy.erratic_stdev_kmh) / policy.erratic_divisor).min(policy.erratic_cap);
    }

    let hour = clock.local_hour;
    if hour >= policy.night_start_hour || hour < policy.night_end_hour {
        risk += policy.night_penalty;
    } else if hour >= policy.afternoon_start_hour && hour <= policy.afternoon_end_hour {
        risk += policy.afternoon_penalty;
    }

    if minutes > policy.recent_onset_min {
        if let Some(recent) = recent_stdev(acc, policy.recent_samples) {
            if recent > policy.recent_stdev_kmh {
                risk += policy.recent_penalty;
            }
        }
    }

    clamp_score(risk)
}

/// Fraction of ticks at or under the posted limit
pub fn discipline_fraction(acc: &EcoAccumulator) -> f64 {
    acc.within_limit_ticks as f64 / acc.tick_count.max(1) as f64
}

/// Fraction of ticks inside the efficient speed band
pub fn optimal_fraction(acc: &EcoAccumulator) -> f64 {
    acc.optimal_speed_ticks as f64 / acc.tick_count.max(1) as f64
}

/// Population standard deviation of the last `window` speed samples
fn recent_stdev(acc: &EcoAccumulator, window: usize) -> Option<f64> {
    let n = acc.recent_speeds.len().min(window);
    if n == 0 {
        return None;
    }
    let recent = acc.recent_speeds.iter().skip(acc.recent_speeds.len() - n);
    let mean = recent.clone().sum::<f64>() / n as f64;
    let variance = recent.map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
    Some(variance.sqrt())
}

fn clamp_score(score: f64) -> u32 {
    score.clamp(0.0, 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(ticks: u64, speed: f64) -> EcoAccumulator {
        let mut acc = EcoAccumulator::default();
        for _ in 0..ticks {
            acc.record_speed(speed, 30);
            acc.record_compliance(speed, Some(100.0), &EcoPolicy::default());
        }
        acc
    }

    fn daytime(minutes: f64) -> DrivingClock {
        DrivingClock {
            driving_min: minutes,
            local_hour: 10,
        }
    }

    #[test]
    fn test_steady_compliant_drive_scores_full() {
        let acc = steady(60, 70.0);
        assert_eq!(compute_eco_score(&acc, &EcoPolicy::default(), 0.0), 100);
        assert_eq!(compute_smoothness_score(&acc, &EcoPolicy::default()), 100);
    }

    #[test]
    fn test_no_ticks_uses_flat_penalties() {
        // No discipline or optimal bonus: 100 - 15 - 5
        let acc = EcoAccumulator::default();
        assert_eq!(compute_eco_score(&acc, &EcoPolicy::default(), 0.0), 80);
    }

    #[test]
    fn test_idle_penalty_capped() {
        let acc = steady(10, 70.0);
        assert_eq!(compute_eco_score(&acc, &EcoPolicy::default(), 1.0), 80);
        assert_eq!(compute_eco_score(&acc, &EcoPolicy::default(), 0.25), 90);
    }

    #[test]
    fn test_corners_penalize_smoothness() {
        let mut acc = steady(10, 70.0);
        acc.hard_corners = 2;
        assert_eq!(compute_smoothness_score(&acc, &EcoPolicy::default()), 92);
        assert_eq!(compute_eco_score(&acc, &EcoPolicy::default(), 0.0), 96);

        acc.hard_corners = 10;
        assert_eq!(compute_smoothness_score(&acc, &EcoPolicy::default()), 80);
        assert_eq!(compute_eco_score(&acc, &EcoPolicy::default(), 0.0), 90);
    }

    #[test]
    fn test_harsh_events_lower_both_scores() {
        let policy = EcoPolicy::default();
        let mut acc = steady(10, 70.0);
        acc.record_acceleration(3.0, &policy);
        acc.record_acceleration(1.0, &policy);

        assert_eq!(compute_smoothness_score(&acc, &policy), 50);
        // Harsh ratio 0.5 costs 15; the 2.0 m/s² average stays under the harsh threshold
        assert_eq!(compute_eco_score(&acc, &policy, 0.0), 85);
    }

    #[test]
    fn test_fatigue_long_night_drive() {
        let acc = EcoAccumulator::default();
        let clock = DrivingClock {
            driving_min: 150.0,
            local_hour: 23,
        };
        // 22.5 + 10 + 20
        assert_eq!(compute_fatigue_risk(&acc, &FatiguePolicy::default(), clock), 53);
    }

    #[test]
    fn test_fatigue_afternoon_dip() {
        let acc = EcoAccumulator::default();
        let clock = DrivingClock {
            driving_min: 10.0,
            local_hour: 15,
        };
        assert_eq!(compute_fatigue_risk(&acc, &FatiguePolicy::default(), clock), 10);
        assert_eq!(compute_fatigue_risk(&acc, &FatiguePolicy::default(), daytime(10.0)), 0);
    }

    #[test]
    fn test_fatigue_recent_variance_after_onset() {
        let mut acc = EcoAccumulator::default();
        for i in 0..30 {
            acc.record_speed(if i % 2 == 0 { 20.0 } else { 80.0 }, 30);
        }
        let policy = FatiguePolicy::default();
        // stdev 30: erratic (30-20)/2 = 5 always; recent +15 only after 30 min
        assert_eq!(compute_fatigue_risk(&acc, &policy, daytime(20.0)), 5);
        assert_eq!(compute_fatigue_risk(&acc, &policy, daytime(31.0)), 20);
    }
}
