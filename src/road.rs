//! Road metadata
//!
//! [`RoadInfo`] is the result contract of the external speed-limit lookup.
//! [`LookupGate`] decides when a new lookup is worth making and discards
//! answers that arrive after a newer query was issued.

use crate::config::LookupPolicy;
use crate::error::TelemetryError;
use crate::types::SpeedUnit;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Speed-limit metadata for the road under the vehicle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadInfo {
    /// Posted limit (km/h)
    pub speed_limit: Option<f64>,
    pub road_name: Option<String>,
    #[serde(default)]
    pub is_school_zone: bool,
}

impl RoadInfo {
    /// All-null result used when a lookup fails
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The posted limit in the given display unit, rounded
    pub fn speed_limit_in(&self, unit: SpeedUnit) -> Option<f64> {
        self.speed_limit.map(|kmh| unit.from_kmh(kmh).round())
    }
}

/// Trait for speed-limit providers
pub trait SpeedLimitLookup {
    /// Look up the road at a coordinate
    fn lookup(&self, latitude: f64, longitude: f64) -> Result<RoadInfo, TelemetryError>;
}

/// Identifies one issued lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupTicket {
    generation: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub issued_at: i64,
}

#[derive(Debug, Clone, Copy)]
struct LastQuery {
    latitude: f64,
    longitude: f64,
    at_ms: i64,
}

/// Throttles lookups and supersedes stale ones
#[derive(Debug, Clone, Default)]
pub struct LookupGate {
    policy: LookupPolicy,
    last: Option<LastQuery>,
    generation: u64,
    in_flight: Option<u64>,
}

impl LookupGate {
    pub fn new(policy: LookupPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Issue a ticket for a new lookup, or `None` if the last one is still fresh.
    ///
    /// A lookup is fresh for `min_interval_ms` unless the vehicle has moved at
    /// least `min_move_deg` in latitude or longitude.
    pub fn begin(&mut self, latitude: f64, longitude: f64, now_ms: i64) -> Option<LookupTicket> {
        if let Some(last) = self.last {
            let recent = now_ms.saturating_sub(last.at_ms) < self.policy.min_interval_ms;
            let nearby = (latitude - last.latitude).abs() < self.policy.min_move_deg
                && (longitude - last.longitude).abs() < self.policy.min_move_deg;
            if recent && nearby {
                return None;
            }
        }

        self.generation += 1;
        if self.in_flight.is_some() {
            debug!("superseding in-flight lookup");
        }
        self.in_flight = Some(self.generation);
        self.last = Some(LastQuery {
            latitude,
            longitude,
            at_ms: now_ms,
        });

        Some(LookupTicket {
            generation: self.generation,
            latitude,
            longitude,
            issued_at: now_ms,
        })
    }

    /// Accept the answer for a ticket.
    ///
    /// Returns `None` for superseded or cancelled tickets. Failures degrade to
    /// [`RoadInfo::unknown`].
    pub fn complete(
        &mut self,
        ticket: LookupTicket,
        result: Result<RoadInfo, TelemetryError>,
    ) -> Option<RoadInfo> {
        if self.in_flight != Some(ticket.generation) {
            debug!("discarding stale lookup #{}", ticket.generation);
            return None;
        }
        self.in_flight = None;

        match result {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(
                    "speed limit lookup at ({:.5}, {:.5}) failed: {}",
                    ticket.latitude, ticket.longitude, e
                );
                Some(RoadInfo::unknown())
            }
        }
    }

    /// Drop any in-flight lookup; its answer will be discarded
    pub fn cancel(&mut self) {
        self.in_flight = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}
