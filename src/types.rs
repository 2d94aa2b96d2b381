//! Shared data types for DriveSense
//!
//! These types flow between the external sensor collaborator, the tracking
//! components and consumers of the live and finalized trip signals.

use serde::{Deserialize, Serialize};

/// Conversion factor from metres per second to kilometres per hour
pub const MS_TO_KMH: f64 = 3.6;

/// Conversion factor from kilometres per hour to miles per hour
pub const KMH_TO_MPH: f64 = 0.621371;

/// A raw position fix as delivered by the device location provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Ground speed in metres per second, if the provider reports one
    #[serde(default)]
    pub speed: Option<f64>,
    /// Course over ground in degrees clockwise from north
    #[serde(default)]
    pub heading: Option<f64>,
    /// Altitude in metres
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in metres
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Fix time (epoch milliseconds)
    pub timestamp: i64,
}

impl PositionSample {
    /// Create a sample with only the required fields set
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed: None,
            heading: None,
            altitude: None,
            accuracy: None,
            timestamp,
        }
    }

    pub fn with_speed(mut self, speed_ms: f64) -> Self {
        self.speed = Some(speed_ms);
        self
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading = Some(heading_deg);
        self
    }

    /// Whether the coordinates are finite and on the globe
    pub fn has_valid_fix(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Availability of the device position source at the moment tracking starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAvailability {
    Available,
    /// The platform has no position provider
    Unsupported,
    /// The user refused location access
    PermissionDenied,
    /// A provider exists but cannot produce a fix
    Unavailable,
}

/// Unit used for anything presented to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Kmh,
    Mph,
}

impl SpeedUnit {
    /// Convert a km/h value into this unit
    pub fn from_kmh(&self, kmh: f64) -> f64 {
        match self {
            SpeedUnit::Kmh => kmh,
            SpeedUnit::Mph => kmh * KMH_TO_MPH,
        }
    }

    /// Unit name as spoken aloud
    pub fn spoken(&self) -> &'static str {
        match self {
            SpeedUnit::Kmh => "kilometers per hour",
            SpeedUnit::Mph => "miles per hour",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            SpeedUnit::Kmh => SpeedUnit::Mph,
            SpeedUnit::Mph => SpeedUnit::Kmh,
        }
    }
}

/// Normalize a heading difference into [-180, 180] degrees
pub fn normalize_heading_delta(delta_deg: f64) -> f64 {
    let mut d = delta_deg % 360.0;
    if d > 180.0 {
        d -= 360.0;
    }
    if d < -180.0 {
        d += 360.0;
    }
    d
}

/// Round to a fixed number of decimal places
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_sample_deserialization() {
        let json = r#"{
            "latitude": 52.52,
            "longitude": 13.405,
            "speed": 13.9,
            "heading": 270.0,
            "timestamp": 1705327200000
        }"#;

        let sample: PositionSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.speed, Some(13.9));
        assert_eq!(sample.heading, Some(270.0));
        assert!(sample.altitude.is_none());
        assert!(sample.has_valid_fix());
    }

    #[test]
    fn test_invalid_fix() {
        assert!(!PositionSample::new(f64::NAN, 0.0, 0).has_valid_fix());
        assert!(!PositionSample::new(91.0, 0.0, 0).has_valid_fix());
    }

    #[test]
    fn test_heading_delta_wraps() {
        assert_eq!(normalize_heading_delta(350.0), -10.0);
        assert_eq!(normalize_heading_delta(-350.0), 10.0);
        assert_eq!(normalize_heading_delta(720.0 + 45.0), 45.0);
        assert_eq!(normalize_heading_delta(180.0), 180.0);
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(SpeedUnit::Kmh.from_kmh(100.0), 100.0);
        assert!((SpeedUnit::Mph.from_kmh(100.0) - 62.1371).abs() < 1e-9);
        assert_eq!(SpeedUnit::Kmh.toggled(), SpeedUnit::Mph);
        assert_eq!(
            serde_json::to_string(&SpeedUnit::Mph).unwrap(),
            "\"mph\""
        );
    }
}
