//! Eco report types

use serde::{Deserialize, Serialize};

/// On-demand projection of the eco accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcoReport {
    /// Composite driving-efficiency rating (0-100)
    pub eco_score: u32,
    /// Share of non-harsh longitudinal events, less a cornering penalty (0-100)
    pub smoothness_score: u32,
    /// Drowsiness risk from duration, time of day and speed variance (0-100)
    pub fatigue_risk_score: u32,
    pub harsh_accelerations: u32,
    pub harsh_brakes: u32,
    pub hard_corners: u32,
    pub total_accelerations: u32,
    pub total_brakes: u32,
    /// Seconds spent below the idle speed
    pub idle_time_s: f64,
    pub idle_periods: u32,
    /// Percentage of ticks at or under the posted limit
    pub speed_discipline_pct: u32,
    /// Percentage of ticks inside the efficient speed band
    pub optimal_speed_pct: u32,
    /// Mean positive acceleration (m/s²)
    pub avg_acceleration: f64,
    /// Mean deceleration magnitude (m/s²)
    pub avg_deceleration: f64,
    pub avg_lateral_g: f64,
    pub max_lateral_g: f64,
    pub coast_down_events: u32,
    /// Population variance of per-tick speed ((km/h)²)
    pub speed_variance: f64,
}

/// The part of an [`EcoReport`] kept with a finished trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcoSnapshot {
    pub eco_score: u32,
    pub smoothness_score: u32,
    pub fatigue_risk_score: u32,
    pub harsh_accelerations: u32,
    pub harsh_brakes: u32,
    pub hard_corners: u32,
    pub idle_time_s: f64,
    pub idle_periods: u32,
    pub speed_discipline_pct: u32,
    pub optimal_speed_pct: u32,
    pub coast_down_events: u32,
    pub max_lateral_g: f64,
}

impl From<&EcoReport> for EcoSnapshot {
    fn from(report: &EcoReport) -> Self {
        Self {
            eco_score: report.eco_score,
            smoothness_score: report.smoothness_score,
            fatigue_risk_score: report.fatigue_risk_score,
            harsh_accelerations: report.harsh_accelerations,
            harsh_brakes: report.harsh_brakes,
            hard_corners: report.hard_corners,
            idle_time_s: report.idle_time_s,
            idle_periods: report.idle_periods,
            speed_discipline_pct: report.speed_discipline_pct,
            optimal_speed_pct: report.optimal_speed_pct,
            coast_down_events: report.coast_down_events,
            max_lateral_g: report.max_lateral_g,
        }
    }
}
