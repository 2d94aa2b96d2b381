//! Engine configuration
//!
//! Every threshold, weight and delay used by the tracking components lives in a
//! policy table here. The defaults reproduce the tuned production values; a JSON
//! document may override any subset of them.

use crate::error::TelemetryError;
use crate::types::SpeedUnit;
use serde::{Deserialize, Serialize};

/// Kinematic noise filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsPolicy {
    /// Speeds below this are treated as stationary (km/h)
    pub noise_floor_kmh: f64,
    /// Displacements at or below this are GPS jitter and not added to distance (m)
    pub min_displacement_m: f64,
}

impl Default for KinematicsPolicy {
    fn default() -> Self {
        Self {
            noise_floor_kmh: 1.0,
            min_displacement_m: 2.0,
        }
    }
}

/// Fatigue risk contributions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatiguePolicy {
    pub long_drive_onset_min: f64,
    pub long_drive_rate_min: f64,
    pub long_drive_cap: f64,
    pub very_long_drive_onset_min: f64,
    pub very_long_drive_rate_min: f64,
    pub very_long_drive_cap: f64,
    /// Overall speed standard deviation above which erratic driving adds risk (km/h)
    pub erratic_stdev_kmh: f64,
    pub erratic_divisor: f64,
    pub erratic_cap: f64,
    /// Local hours [night_start, 24) and [0, night_end) add `night_penalty`
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub night_penalty: f64,
    /// Local hours [afternoon_start, afternoon_end] add `afternoon_penalty`
    pub afternoon_start_hour: u32,
    pub afternoon_end_hour: u32,
    pub afternoon_penalty: f64,
    /// Minutes of driving before recent-variance checks apply
    pub recent_onset_min: f64,
    /// Number of most recent speed samples inspected
    pub recent_samples: usize,
    pub recent_stdev_kmh: f64,
    pub recent_penalty: f64,
}

impl Default for FatiguePolicy {
    fn default() -> Self {
        Self {
            long_drive_onset_min: 60.0,
            long_drive_rate_min: 4.0,
            long_drive_cap: 30.0,
            very_long_drive_onset_min: 120.0,
            very_long_drive_rate_min: 3.0,
            very_long_drive_cap: 20.0,
            erratic_stdev_kmh: 20.0,
            erratic_divisor: 2.0,
            erratic_cap: 15.0,
            night_start_hour: 23,
            night_end_hour: 5,
            night_penalty: 20.0,
            afternoon_start_hour: 13,
            afternoon_end_hour: 15,
            afternoon_penalty: 10.0,
            recent_onset_min: 30.0,
            recent_samples: 30,
            recent_stdev_kmh: 25.0,
            recent_penalty: 15.0,
        }
    }
}

/// Eco engine thresholds and score weights.
///
/// The score shape (additive penalties, flat penalties replaced by scaled
/// bonuses) is an empirical policy, so every constant is exposed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoPolicy {
    /// Longitudinal acceleration magnitude that counts as an event (m/s²)
    pub accel_event_ms2: f64,
    pub harsh_accel_ms2: f64,
    /// Negative: decelerations below this are harsh brakes (m/s²)
    pub harsh_brake_ms2: f64,
    /// Negative: decelerations above this (and below -accel_event) are coast-downs
    pub coast_brake_ms2: f64,
    /// Inter-tick intervals at or above this are gaps, not derivatives (s)
    pub max_interval_s: f64,
    pub idle_speed_kmh: f64,
    pub corner_min_speed_kmh: f64,
    pub lateral_g_noise_floor: f64,
    pub hard_corner_g: f64,
    pub eco_speed_min_kmh: f64,
    pub eco_speed_max_kmh: f64,

    pub harsh_ratio_penalty: f64,
    pub idle_ratio_weight: f64,
    pub idle_penalty_cap: f64,
    pub consistency_divisor: f64,
    pub consistency_cap: f64,
    /// Flat penalty replaced by a discipline bonus of up to the same amount
    pub discipline_bonus: f64,
    pub optimal_flat_penalty: f64,
    pub optimal_bonus: f64,
    pub harsh_avg_accel_rate: f64,
    pub harsh_avg_accel_cap: f64,
    pub corner_eco_penalty: f64,
    pub corner_eco_cap: f64,
    pub corner_smoothness_penalty: f64,
    pub corner_smoothness_cap: f64,

    pub fatigue: FatiguePolicy,
}

impl Default for EcoPolicy {
    fn default() -> Self {
        Self {
            accel_event_ms2: 0.3,
            harsh_accel_ms2: 2.5,
            harsh_brake_ms2: -3.0,
            coast_brake_ms2: -1.0,
            max_interval_s: 10.0,
            idle_speed_kmh: 2.0,
            corner_min_speed_kmh: 5.0,
            lateral_g_noise_floor: 0.05,
            hard_corner_g: 0.3,
            eco_speed_min_kmh: 50.0,
            eco_speed_max_kmh: 90.0,
            harsh_ratio_penalty: 30.0,
            idle_ratio_weight: 40.0,
            idle_penalty_cap: 20.0,
            consistency_divisor: 3.0,
            consistency_cap: 15.0,
            discipline_bonus: 15.0,
            optimal_flat_penalty: 5.0,
            optimal_bonus: 10.0,
            harsh_avg_accel_rate: 5.0,
            harsh_avg_accel_cap: 10.0,
            corner_eco_penalty: 2.0,
            corner_eco_cap: 10.0,
            corner_smoothness_penalty: 4.0,
            corner_smoothness_cap: 20.0,
            fatigue: FatiguePolicy::default(),
        }
    }
}

/// Over-speed alarm tiers and cycle periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmPolicy {
    pub mild_over_kmh: f64,
    pub moderate_over_kmh: f64,
    pub aggressive_over_kmh: f64,
    pub mild_period_ms: i64,
    pub moderate_period_ms: i64,
    pub aggressive_period_ms: i64,
    pub flash_ms: i64,
    pub warning_text: String,
}

impl Default for AlarmPolicy {
    fn default() -> Self {
        Self {
            mild_over_kmh: 5.0,
            moderate_over_kmh: 10.0,
            aggressive_over_kmh: 20.0,
            mild_period_ms: 3_000,
            moderate_period_ms: 2_000,
            aggressive_period_ms: 1_500,
            flash_ms: 150,
            warning_text: "Reduce speed.".to_string(),
        }
    }
}

/// Turn detection window and severity thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnPolicy {
    pub window_ms: i64,
    pub min_span_ms: i64,
    pub min_speed_kmh: f64,
    pub sharp_deg: f64,
    pub mild_deg: f64,
    pub cooldown_ms: i64,
    pub mild_clear_ms: i64,
    pub warning_text: String,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self {
            window_ms: 3_000,
            min_span_ms: 500,
            min_speed_kmh: 30.0,
            sharp_deg: 45.0,
            mild_deg: 25.0,
            cooldown_ms: 5_000,
            mild_clear_ms: 3_000,
            warning_text: "Sharp turn ahead".to_string(),
        }
    }
}

/// Zone announcement settle delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonePolicy {
    pub school_settle_ms: i64,
    pub limit_settle_ms: i64,
}

impl Default for ZonePolicy {
    fn default() -> Self {
        Self {
            school_settle_ms: 300,
            limit_settle_ms: 500,
        }
    }
}

/// Break reminder schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakPolicy {
    pub first_alert_ms: i64,
    pub repeat_ms: i64,
}

impl Default for BreakPolicy {
    fn default() -> Self {
        Self {
            first_alert_ms: 2 * 60 * 60 * 1000,
            repeat_ms: 30 * 60 * 1000,
        }
    }
}

/// Speed-limit lookup throttling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupPolicy {
    pub min_interval_ms: i64,
    pub min_move_deg: f64,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            min_interval_ms: 5_000,
            min_move_deg: 0.0005,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kinematics: KinematicsPolicy,
    pub eco: EcoPolicy,
    pub alarm: AlarmPolicy,
    pub turn: TurnPolicy,
    pub zone: ZonePolicy,
    pub breaks: BreakPolicy,
    pub lookup: LookupPolicy,
    /// Unit for spoken output
    pub unit: SpeedUnit,
    pub announcements_enabled: bool,
    /// Periodically speak the current speed
    pub hands_free: bool,
    pub readout_interval_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kinematics: KinematicsPolicy::default(),
            eco: EcoPolicy::default(),
            alarm: AlarmPolicy::default(),
            turn: TurnPolicy::default(),
            zone: ZonePolicy::default(),
            breaks: BreakPolicy::default(),
            lookup: LookupPolicy::default(),
            unit: SpeedUnit::Kmh,
            announcements_enabled: true,
            hands_free: false,
            readout_interval_ms: 30_000,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject thresholds that would make the state machines ill-defined
    pub fn validate(&self) -> Result<(), TelemetryError> {
        let alarm = &self.alarm;
        if !(alarm.mild_over_kmh > 0.0
            && alarm.mild_over_kmh < alarm.moderate_over_kmh
            && alarm.moderate_over_kmh < alarm.aggressive_over_kmh)
        {
            return Err(invalid("alarm tiers must be positive and strictly increasing"));
        }
        if alarm.mild_period_ms <= 0
            || alarm.moderate_period_ms <= 0
            || alarm.aggressive_period_ms <= 0
        {
            return Err(invalid("alarm cycle periods must be positive"));
        }

        let turn = &self.turn;
        if !(turn.mild_deg > 0.0 && turn.mild_deg < turn.sharp_deg) {
            return Err(invalid("turn mild threshold must be positive and below sharp"));
        }
        if turn.window_ms <= 0 || turn.min_span_ms < 0 || turn.min_span_ms > turn.window_ms {
            return Err(invalid("turn window must be positive and cover the minimum span"));
        }

        let eco = &self.eco;
        if !(eco.accel_event_ms2 > 0.0 && eco.harsh_accel_ms2 > eco.accel_event_ms2) {
            return Err(invalid("harsh acceleration must exceed the event threshold"));
        }
        if !(eco.harsh_brake_ms2 < eco.coast_brake_ms2 && eco.coast_brake_ms2 < -eco.accel_event_ms2)
        {
            return Err(invalid("brake thresholds must satisfy harsh < coast < -event"));
        }
        if eco.max_interval_s <= 0.0 || eco.eco_speed_min_kmh >= eco.eco_speed_max_kmh {
            return Err(invalid("eco interval and optimal speed band must be well-formed"));
        }

        if self.breaks.first_alert_ms <= 0 || self.breaks.repeat_ms <= 0 {
            return Err(invalid("break reminder intervals must be positive"));
        }
        if self.readout_interval_ms <= 0 {
            return Err(invalid("readout interval must be positive"));
        }
        if self.zone.school_settle_ms < 0 || self.zone.limit_settle_ms < 0 {
            return Err(invalid("settle delays cannot be negative"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> TelemetryError {
    TelemetryError::InvalidConfig(msg.to_string())
}
