//! Trip recording
//!
//! Segments continuous over-limit periods into speeding incidents and freezes
//! the whole trip into an immutable [`TripRecord`] when recording stops.

use crate::eco::EcoSnapshot;
use crate::error::TelemetryError;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A continuous interval above the posted limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedingIncident {
    /// Epoch ms
    pub start_time: i64,
    /// Epoch ms
    pub end_time: i64,
    /// Largest excess over the limit (km/h)
    pub max_over_speed: f64,
    /// Limit in force when the incident closed (km/h)
    pub speed_limit: f64,
    pub max_speed: f64,
}

/// Summary of a finished trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Metres
    pub total_distance: f64,
    /// Seconds
    pub duration: f64,
    pub max_speed: f64,
    /// Mean of positive speed samples (km/h)
    pub avg_speed: f64,
    pub speeding_incidents: Vec<SpeedingIncident>,
    /// Seconds spent continuously over the limit
    pub time_over_limit: f64,
    pub worst_overspeed: f64,
    pub eco: Option<EcoSnapshot>,
}

impl TripRecord {
    pub fn to_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start_time).single()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.end_time).single()
    }
}

/// An incident that has not yet closed
#[derive(Debug, Clone)]
struct OpenIncident {
    start_time: i64,
    max_over_speed: f64,
    speed_limit: f64,
    max_speed: f64,
}

impl OpenIncident {
    fn close(self, end_time: i64) -> SpeedingIncident {
        SpeedingIncident {
            start_time: self.start_time,
            end_time,
            max_over_speed: self.max_over_speed,
            speed_limit: self.speed_limit,
            max_speed: self.max_speed,
        }
    }
}

/// Records speeding incidents over a trip
#[derive(Debug, Clone, Default)]
pub struct TripRecorder {
    recording: bool,
    start_time: i64,
    incidents: Vec<SpeedingIncident>,
    current: Option<OpenIncident>,
    time_over_limit_s: f64,
    last_over_limit_ms: Option<i64>,
    worst_overspeed: f64,
    max_speed: f64,
    positive_speed_sum: f64,
    positive_samples: u64,
    record: Option<TripRecord>,
}

impl TripRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every accumulator and begin recording
    pub fn start(&mut self, now_ms: i64) {
        *self = Self {
            recording: true,
            start_time: now_ms,
            ..Self::default()
        };
    }

    /// Fold one speed/limit observation into the trip
    pub fn tick(&mut self, speed_kmh: f64, speed_limit_kmh: Option<f64>, now_ms: i64) {
        if !self.recording {
            return;
        }

        if speed_kmh > 0.0 {
            self.positive_speed_sum += speed_kmh;
            self.positive_samples += 1;
        }
        self.max_speed = self.max_speed.max(speed_kmh);

        let limit = match speed_limit_kmh {
            Some(limit) if limit > 0.0 && speed_kmh > limit => limit,
            _ => {
                self.close_incident(now_ms);
                self.last_over_limit_ms = None;
                return;
            }
        };

        let over_by = speed_kmh - limit;
        if let Some(last) = self.last_over_limit_ms {
            self.time_over_limit_s += now_ms.saturating_sub(last).max(0) as f64 / 1000.0;
        }
        self.last_over_limit_ms = Some(now_ms);
        self.worst_overspeed = self.worst_overspeed.max(over_by);

        match self.current.as_mut() {
            Some(open) => {
                open.max_over_speed = open.max_over_speed.max(over_by);
                open.max_speed = open.max_speed.max(speed_kmh);
                open.speed_limit = limit;
            }
            None => {
                debug!("speeding incident opened: {:.1} over {:.0}", over_by, limit);
                self.current = Some(OpenIncident {
                    start_time: now_ms,
                    max_over_speed: over_by,
                    speed_limit: limit,
                    max_speed: speed_kmh,
                });
            }
        }
    }

    fn close_incident(&mut self, now_ms: i64) {
        if let Some(open) = self.current.take() {
            let incident = open.close(now_ms);
            debug!(
                "speeding incident closed: max {:.1} over after {} ms",
                incident.max_over_speed,
                incident.end_time - incident.start_time
            );
            self.incidents.push(incident);
        }
    }

    /// Finish the trip. Returns `None` if nothing was being recorded.
    pub fn stop(
        &mut self,
        distance_m: f64,
        duration_s: f64,
        eco: Option<EcoSnapshot>,
        now_ms: i64,
    ) -> Option<TripRecord> {
        if !self.recording {
            return None;
        }
        self.close_incident(now_ms);

        let avg_speed = if self.positive_samples > 0 {
            self.positive_speed_sum / self.positive_samples as f64
        } else {
            0.0
        };

        let record = TripRecord {
            trip_id: Uuid::new_v4().to_string(),
            start_time: self.start_time,
            end_time: now_ms,
            total_distance: distance_m,
            duration: duration_s,
            max_speed: self.max_speed,
            avg_speed,
            speeding_incidents: std::mem::take(&mut self.incidents),
            time_over_limit: self.time_over_limit_s,
            worst_overspeed: self.worst_overspeed,
            eco,
        };

        self.recording = false;
        self.last_over_limit_ms = None;
        self.record = Some(record.clone());
        Some(record)
    }

    /// Discard the finished record
    pub fn clear(&mut self) {
        self.recording = false;
        self.record = None;
    }

    pub fn record(&self) -> Option<&TripRecord> {
        self.record.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Incidents closed so far in the current trip
    pub fn incidents(&self) -> &[SpeedingIncident] {
        &self.incidents
    }

    pub fn has_open_incident(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn recording() -> TripRecorder {
        let mut recorder = TripRecorder::new();
        recorder.start(0);
        recorder
    }

    #[test]
    fn test_single_incident() {
        let mut recorder = recording();
        recorder.tick(60.0, Some(50.0), 1_000);
        recorder.tick(40.0, Some(50.0), 2_000);

        assert_eq!(recorder.incidents().len(), 1);
        let incident = &recorder.incidents()[0];
        assert_relative_eq!(incident.max_over_speed, 10.0);
        assert_eq!(incident.start_time, 1_000);
        assert_eq!(incident.end_time, 2_000);
        assert_relative_eq!(incident.max_speed, 60.0);
    }

    #[test]
    fn test_incident_extends_and_refreshes_limit() {
        let mut recorder = recording();
        recorder.tick(60.0, Some(50.0), 1_000);
        recorder.tick(75.0, Some(50.0), 2_000);
        recorder.tick(70.0, Some(60.0), 3_500);

        let record = recorder.stop(1_000.0, 4.0, None, 4_000).unwrap();
        assert_eq!(record.speeding_incidents.len(), 1);
        let incident = &record.speeding_incidents[0];
        assert_relative_eq!(incident.max_over_speed, 25.0);
        assert_relative_eq!(incident.max_speed, 75.0);
        assert_relative_eq!(incident.speed_limit, 60.0);
        assert_eq!(incident.end_time, 4_000);
        assert_relative_eq!(record.time_over_limit, 2.5);
        assert_relative_eq!(record.worst_overspeed, 25.0);
    }

    #[test]
    fn test_missing_or_zero_limit_is_compliant() {
        let mut recorder = recording();
        recorder.tick(120.0, None, 1_000);
        recorder.tick(120.0, Some(0.0), 2_000);
        assert!(!recorder.has_open_incident());

        recorder.tick(120.0, Some(100.0), 3_000);
        assert!(recorder.has_open_incident());
        recorder.tick(120.0, None, 4_000);
        assert!(!recorder.has_open_incident());
        assert_eq!(recorder.incidents().len(), 1);
    }

    #[test]
    fn test_time_over_limit_only_counts_continuous_runs() {
        let mut recorder = recording();
        recorder.tick(60.0, Some(50.0), 1_000);
        recorder.tick(60.0, Some(50.0), 2_000);
        recorder.tick(40.0, Some(50.0), 3_000);
        recorder.tick(60.0, Some(50.0), 10_000);
        recorder.tick(60.0, Some(50.0), 11_000);

        let record = recorder.stop(0.0, 11.0, None, 11_000).unwrap();
        assert_relative_eq!(record.time_over_limit, 2.0);
        assert_eq!(record.speeding_incidents.len(), 2);
    }

    #[test]
    fn test_average_over_positive_samples() {
        let mut recorder = recording();
        for speed in [0.0, 30.0, 0.0, 50.0] {
            recorder.tick(speed, None, 1_000);
        }
        let record = recorder.stop(500.0, 60.0, None, 60_000).unwrap();
        assert_relative_eq!(record.avg_speed, 40.0);
        assert_relative_eq!(record.max_speed, 50.0);
        assert_eq!(record.start_time, 0);
        assert_eq!(record.end_time, 60_000);
    }

    #[test]
    fn test_stop_without_start() {
        let mut recorder = TripRecorder::new();
        assert!(recorder.stop(0.0, 0.0, None, 0).is_none());
    }

    #[test]
    fn test_record_frozen_after_stop() {
        let mut recorder = recording();
        recorder.tick(60.0, Some(50.0), 1_000);
        let record = recorder.stop(0.0, 1.0, None, 2_000).unwrap();

        // Ticks after stop are ignored
        recorder.tick(90.0, Some(50.0), 3_000);
        assert_eq!(recorder.record(), Some(&record));
        assert!(!recorder.is_recording());

        recorder.clear();
        assert!(recorder.record().is_none());
    }

    #[test]
    fn test_restart_resets() {
        let mut recorder = recording();
        recorder.tick(60.0, Some(50.0), 1_000);
        recorder.stop(0.0, 1.0, None, 2_000);
        recorder.start(5_000);

        let record = recorder.stop(0.0, 0.0, None, 6_000).unwrap();
        assert!(record.speeding_incidents.is_empty());
        assert_eq!(record.worst_overspeed, 0.0);
        assert_eq!(record.start_time, 5_000);
    }

    #[test]
    fn test_record_json() {
        let mut recorder = recording();
        recorder.tick(60.0, Some(50.0), 1_000);
        let record = recorder.stop(1234.5, 2.0, None, 2_000).unwrap();

        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["speeding_incidents"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["eco"], serde_json::Value::Null);
        assert!(Uuid::parse_str(&record.trip_id).is_ok());
        assert_eq!(record.started_at().map(|t| t.timestamp_millis()), Some(0));
    }
}
