//! Eco statistics accumulation
//!
//! Raw per-trip counters. Classification of individual ticks happens here;
//! turning the counters into scores is the job of [`crate::eco::scoring`].

use crate::config::EcoPolicy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Streaming mean/variance (Welford)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population variance; zero until at least two values are seen
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / self.count as f64).max(0.0)
        } else {
            0.0
        }
    }
}

/// Per-trip eco counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcoAccumulator {
    pub tick_count: u64,
    pub within_limit_ticks: u64,
    pub optimal_speed_ticks: u64,

    pub total_accelerations: u32,
    pub total_brakes: u32,
    pub harsh_accelerations: u32,
    pub harsh_brakes: u32,
    pub coast_down_events: u32,
    /// Positive accelerations above the event threshold (m/s²)
    pub acceleration: RunningStats,
    /// Deceleration magnitudes above the event threshold (m/s²)
    pub deceleration: RunningStats,

    pub hard_corners: u32,
    /// Lateral-G samples above the noise floor
    pub lateral_g: RunningStats,
    pub max_lateral_g: f64,

    pub idle_time_s: f64,
    pub idle_periods: u32,

    /// Per-tick speed (km/h)
    pub speed: RunningStats,
    /// Most recent per-tick speeds, bounded by the fatigue sample window
    pub recent_speeds: VecDeque<f64>,
}

impl EcoAccumulator {
    /// Count a tick and record its speed
    pub fn record_speed(&mut self, speed_kmh: f64, recent_capacity: usize) {
        self.tick_count += 1;
        self.speed.push(speed_kmh);
        self.recent_speeds.push_back(speed_kmh);
        while self.recent_speeds.len() > recent_capacity {
            self.recent_speeds.pop_front();
        }
    }

    /// Classify a longitudinal acceleration (m/s²)
    pub fn record_acceleration(&mut self, accel: f64, policy: &EcoPolicy) {
        if accel > policy.accel_event_ms2 {
            self.total_accelerations += 1;
            self.acceleration.push(accel);
            if accel > policy.harsh_accel_ms2 {
                self.harsh_accelerations += 1;
            }
        } else if accel < -policy.accel_event_ms2 {
            self.total_brakes += 1;
            self.deceleration.push(accel.abs());
            if accel < policy.harsh_brake_ms2 {
                self.harsh_brakes += 1;
            }
            if accel > policy.coast_brake_ms2 {
                self.coast_down_events += 1;
            }
        }
    }

    /// Record a lateral-G sample above the noise floor
    pub fn record_lateral_g(&mut self, lateral_g: f64) {
        self.lateral_g.push(lateral_g);
        if lateral_g > self.max_lateral_g {
            self.max_lateral_g = lateral_g;
        }
    }

    /// Track speed-limit compliance and the efficient-speed band
    pub fn record_compliance(&mut self, speed_kmh: f64, limit_kmh: Option<f64>, policy: &EcoPolicy) {
        match limit_kmh {
            Some(limit) if speed_kmh > limit => {}
            _ => self.within_limit_ticks += 1,
        }

        let in_band = speed_kmh >= policy.eco_speed_min_kmh && speed_kmh <= policy.eco_speed_max_kmh;
        let slow_zone = speed_kmh > 0.0
            && speed_kmh < policy.eco_speed_min_kmh
            && limit_kmh.is_some_and(|limit| limit < policy.eco_speed_min_kmh);
        if in_band || slow_zone {
            self.optimal_speed_ticks += 1;
        }
    }

    /// Harsh events over all longitudinal events; zero when there are none
    pub fn harsh_event_ratio(&self) -> f64 {
        let total = self.total_accelerations + self.total_brakes;
        if total == 0 {
            return 0.0;
        }
        (self.harsh_accelerations + self.harsh_brakes) as f64 / total as f64
    }
}
