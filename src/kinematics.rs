//! Kinematic tracking
//!
//! Converts raw position fixes into live speed, distance and duration. This is
//! the leaf of the tick graph: every other component consumes the
//! [`MotionState`] snapshot produced here.

use crate::config::KinematicsPolicy;
use crate::error::TelemetryError;
use crate::types::{PositionSample, SourceAvailability, MS_TO_KMH};
use log::debug;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances (metres)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates using the haversine formula (metres)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Live trip kinematics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    /// Current speed (km/h), zero below the noise floor
    pub speed_kmh: f64,
    /// Highest nonzero speed seen this trip (km/h)
    pub max_speed_kmh: f64,
    /// Mean of nonzero speeds this trip (km/h)
    pub avg_speed_kmh: f64,
    /// Cumulative distance (metres)
    pub distance_m: f64,
    /// Elapsed trip time (seconds)
    pub duration_s: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Time of the most recent fix (epoch ms)
    pub timestamp: Option<i64>,
    pub is_tracking: bool,
    /// Human-readable reason tracking could not start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Converts position samples into [`MotionState`]
#[derive(Debug, Clone)]
pub struct KinematicTracker {
    policy: KinematicsPolicy,
    state: MotionState,
    start_ms: Option<i64>,
    prev_fix: Option<(f64, f64)>,
    moving_speed_sum: f64,
    moving_samples: u64,
}

impl Default for KinematicTracker {
    fn default() -> Self {
        Self::new(KinematicsPolicy::default())
    }
}

impl KinematicTracker {
    pub fn new(policy: KinematicsPolicy) -> Self {
        Self {
            policy,
            state: MotionState::default(),
            start_ms: None,
            prev_fix: None,
            moving_speed_sum: 0.0,
            moving_samples: 0,
        }
    }

    /// Begin a trip.
    ///
    /// Fails, leaving tracking off, when the position source cannot deliver fixes.
    pub fn start(
        &mut self,
        availability: SourceAvailability,
        now_ms: i64,
    ) -> Result<(), TelemetryError> {
        let failure = match availability {
            SourceAvailability::Available => None,
            SourceAvailability::Unsupported => Some(TelemetryError::PositionUnsupported),
            SourceAvailability::PermissionDenied => Some(TelemetryError::PermissionDenied),
            SourceAvailability::Unavailable => Some(TelemetryError::PositionUnavailable),
        };
        if let Some(err) = failure {
            debug!("position source rejected start: {}", err);
            self.state.error = Some(err.to_string());
            self.state.is_tracking = false;
            return Err(err);
        }

        self.clear_trip(now_ms);
        self.state.is_tracking = true;
        self.state.error = None;
        Ok(())
    }

    /// Stop consuming samples. Trip statistics stay readable.
    pub fn stop(&mut self) {
        self.state.is_tracking = false;
    }

    /// Zero the trip statistics without stopping
    pub fn reset(&mut self, now_ms: i64) {
        self.clear_trip(now_ms);
    }

    fn clear_trip(&mut self, now_ms: i64) {
        self.start_ms = Some(now_ms);
        self.prev_fix = None;
        self.moving_speed_sum = 0.0;
        self.moving_samples = 0;
        self.state.max_speed_kmh = 0.0;
        self.state.avg_speed_kmh = 0.0;
        self.state.distance_m = 0.0;
        self.state.duration_s = 0.0;
    }

    /// Fold a position fix into the motion state
    pub fn ingest(&mut self, sample: &PositionSample) -> &MotionState {
        if !self.state.is_tracking {
            return &self.state;
        }

        let mut speed_kmh = sample.speed.map(|s| s * MS_TO_KMH).unwrap_or(0.0);
        if !speed_kmh.is_finite() || speed_kmh < self.policy.noise_floor_kmh {
            speed_kmh = 0.0;
        }

        if sample.has_valid_fix() {
            if let Some((prev_lat, prev_lon)) = self.prev_fix {
                let dist =
                    haversine_distance(prev_lat, prev_lon, sample.latitude, sample.longitude);
                if dist > self.policy.min_displacement_m {
                    self.state.distance_m += dist;
                }
            }
            self.prev_fix = Some((sample.latitude, sample.longitude));
        }

        if speed_kmh > 0.0 {
            self.moving_speed_sum += speed_kmh;
            self.moving_samples += 1;
            self.state.max_speed_kmh = self.state.max_speed_kmh.max(speed_kmh);
        }
        self.state.avg_speed_kmh = if self.moving_samples > 0 {
            self.moving_speed_sum / self.moving_samples as f64
        } else {
            0.0
        };

        self.state.speed_kmh = speed_kmh;
        self.state.latitude = Some(sample.latitude);
        self.state.longitude = Some(sample.longitude);
        self.state.heading = sample.heading;
        self.state.altitude = sample.altitude;
        self.state.accuracy = sample.accuracy;
        self.state.timestamp = Some(sample.timestamp);
        self.refresh_duration(sample.timestamp);

        &self.state
    }

    /// Refresh elapsed duration from the wall clock between fixes
    pub fn tick_clock(&mut self, now_ms: i64) {
        if self.state.is_tracking {
            self.refresh_duration(now_ms);
        }
    }

    fn refresh_duration(&mut self, now_ms: i64) {
        if let Some(start) = self.start_ms {
            self.state.duration_s = now_ms.saturating_sub(start).max(0) as f64 / 1000.0;
        }
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state.is_tracking
    }
}
