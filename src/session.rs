//! Drive session
//!
//! [`DriveSession`] owns one of every tracking component and fans each
//! position tick out to them from a single kinematic snapshot:
//!
//! ```text
//! sample → KinematicTracker → MotionState ─┬→ AlarmTierController (over-limit)
//!                                          ├→ TurnDetector (heading)
//!                                          ├→ TripRecorder
//!                                          └→ BehaviorScorer
//! road info → ZoneAnnouncer
//! clock → advance() → every component's timers
//! ```

use crate::alarm::{AlarmState, AlarmTierController};
use crate::config::EngineConfig;
use crate::drowsy::{BreakReminder, BreakState};
use crate::eco::{BehaviorScorer, EcoReport};
use crate::effects::{speak_best_effort, AudioSink, Utterance};
use crate::error::TelemetryError;
use crate::kinematics::{KinematicTracker, MotionState};
use crate::road::{LookupGate, LookupTicket, RoadInfo, SpeedLimitLookup};
use crate::timer::Timer;
use crate::trip::{TripRecord, TripRecorder};
use crate::turn::{TurnDetector, TurnState};
use crate::types::{PositionSample, SourceAvailability, SpeedUnit};
use crate::zone::{ZoneAnnouncer, ZoneState};
use chrono::{DateTime, Local, TimeZone, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything a consumer needs to render one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub motion: MotionState,
    pub road: RoadInfo,
    /// Current speed in the display unit
    pub display_speed: f64,
    /// Posted limit in the display unit, rounded
    pub display_speed_limit: Option<f64>,
    /// Amount over the posted limit (km/h), zero when compliant
    pub over_by_kmh: f64,
    pub alarm: AlarmState,
    pub turn: TurnState,
    pub zone: ZoneState,
    pub breaks: BreakState,
    pub unit: SpeedUnit,
    pub hands_free: bool,
}

/// Orchestrates the tracking components for one driver
pub struct DriveSession {
    config: EngineConfig,
    tracker: KinematicTracker,
    eco: BehaviorScorer,
    alarm: AlarmTierController,
    turn: TurnDetector,
    trip: TripRecorder,
    zone: ZoneAnnouncer,
    breaks: BreakReminder,
    gate: LookupGate,
    road: RoadInfo,
    unit: SpeedUnit,
    hands_free: bool,
    readout: Timer,
}

impl Default for DriveSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DriveSession {
    pub fn new(config: EngineConfig) -> Self {
        let mut zone = ZoneAnnouncer::new(config.zone.clone(), config.unit);
        zone.set_enabled(config.announcements_enabled);

        Self {
            tracker: KinematicTracker::new(config.kinematics.clone()),
            eco: BehaviorScorer::new(config.eco.clone()),
            alarm: AlarmTierController::new(config.alarm.clone()),
            turn: TurnDetector::new(config.turn.clone()),
            trip: TripRecorder::new(),
            zone,
            breaks: BreakReminder::new(config.breaks.clone()),
            gate: LookupGate::new(config.lookup.clone()),
            road: RoadInfo::unknown(),
            unit: config.unit,
            hands_free: config.hands_free,
            readout: Timer::new(),
            config,
        }
    }

    /// Validate the configuration before building a session
    pub fn try_new(config: EngineConfig) -> Result<Self, TelemetryError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Begin a trip. Fails without touching any component when the position
    /// source is unavailable.
    pub fn start(&mut self, availability: SourceAvailability, now_ms: i64) -> Result<(), TelemetryError> {
        self.tracker.start(availability, now_ms)?;
        self.eco.start(now_ms);
        self.trip.start(now_ms);
        self.alarm.stop();
        self.turn.stop();
        self.breaks.start(now_ms);
        if self.hands_free {
            self.readout.arm(now_ms, self.config.readout_interval_ms);
        }
        info!("tracking started at {}", now_ms);
        Ok(())
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// Process one position fix
    pub fn push_sample(
        &mut self,
        sample: &PositionSample,
        sink: &mut dyn AudioSink,
    ) -> Result<LiveSnapshot, TelemetryError> {
        if !self.is_tracking() {
            return Err(TelemetryError::NotTracking);
        }
        let now_ms = sample.timestamp;
        self.advance(now_ms, sink);

        let speed = self.tracker.ingest(sample).speed_kmh;
        let heading = sample.heading;
        let limit = self.road.speed_limit;

        self.alarm.update(over_limit(speed, limit), now_ms, sink);
        if let Some(h) = heading {
            self.turn.update_heading(h, Some(speed), now_ms, sink);
        }
        self.trip.tick(speed, limit, now_ms);
        self.eco.tick(speed, limit, now_ms, heading);

        Ok(self.snapshot())
    }

    /// Adopt new road metadata, typically the answer to a lookup
    pub fn apply_road_info(&mut self, info: RoadInfo, now_ms: i64, sink: &mut dyn AudioSink) {
        debug!(
            "road info: limit {:?}, school zone {}",
            info.speed_limit, info.is_school_zone
        );
        self.zone.observe(info.speed_limit, info.is_school_zone, now_ms);
        self.road = info;
        self.zone.advance(now_ms, sink);

        // A new limit re-grades the current speed without waiting for a fix
        if self.is_tracking() {
            let speed = self.tracker.state().speed_kmh;
            self.alarm
                .update(over_limit(speed, self.road.speed_limit), now_ms, sink);
        }
    }

    /// Issue a lookup ticket if the last lookup is stale. The caller performs
    /// the lookup and hands the answer to [`DriveSession::complete_lookup`].
    pub fn begin_lookup(&mut self, latitude: f64, longitude: f64, now_ms: i64) -> Option<LookupTicket> {
        self.gate.begin(latitude, longitude, now_ms)
    }

    /// Apply the answer to a lookup. Stale answers are ignored.
    pub fn complete_lookup(
        &mut self,
        ticket: LookupTicket,
        result: Result<RoadInfo, TelemetryError>,
        now_ms: i64,
        sink: &mut dyn AudioSink,
    ) -> Option<RoadInfo> {
        let info = self.gate.complete(ticket, result)?;
        self.apply_road_info(info.clone(), now_ms, sink);
        Some(info)
    }

    /// Throttled synchronous lookup through `provider`
    pub fn lookup_road(
        &mut self,
        provider: &dyn SpeedLimitLookup,
        latitude: f64,
        longitude: f64,
        now_ms: i64,
        sink: &mut dyn AudioSink,
    ) -> Option<RoadInfo> {
        let ticket = self.begin_lookup(latitude, longitude, now_ms)?;
        let result = provider.lookup(latitude, longitude);
        self.complete_lookup(ticket, result, now_ms, sink)
    }

    /// Drive every component's timers up to `now_ms`
    pub fn advance(&mut self, now_ms: i64, sink: &mut dyn AudioSink) {
        self.zone.advance(now_ms, sink);
        if !self.is_tracking() {
            return;
        }
        self.tracker.tick_clock(now_ms);
        self.alarm.advance(now_ms, sink);
        self.turn.advance(now_ms, sink);
        self.breaks.advance(now_ms, sink);

        if let Some(fired) = self.readout.fire_if_due(now_ms) {
            self.speak_readout(sink);
            let interval = self.config.readout_interval_ms.max(1);
            let missed = now_ms.saturating_sub(fired) / interval;
            self.readout.arm(fired, (missed + 1).saturating_mul(interval));
        }
    }

    fn speak_readout(&self, sink: &mut dyn AudioSink) {
        let speed = self.unit.from_kmh(self.tracker.state().speed_kmh).round();
        if speed > 0.0 {
            let text = format!("{} {}", speed, self.unit.spoken());
            speak_best_effort(sink, &Utterance::new(text).with_volume(0.6));
        }
    }

    /// End the trip, cancel every pending timer and return the trip record
    pub fn stop(&mut self, now_ms: i64) -> Option<TripRecord> {
        self.stop_at(now_ms, &local_time(now_ms))
    }

    /// [`DriveSession::stop`] with an explicit clock for the eco snapshot
    pub fn stop_at<Tz: TimeZone>(&mut self, now_ms: i64, now: &DateTime<Tz>) -> Option<TripRecord> {
        if self.is_tracking() {
            self.tracker.tick_clock(now_ms);
        }
        let motion = self.tracker.state();
        let (distance, duration) = (motion.distance_m, motion.duration_s);

        let eco = self.trip.is_recording().then(|| self.eco.snapshot(now));
        self.eco.stop();
        let record = self.trip.stop(distance, duration, eco, now_ms);

        self.tracker.stop();
        self.alarm.stop();
        self.turn.stop();
        self.breaks.stop();
        self.zone.cancel_pending();
        self.gate.cancel();
        self.readout.cancel();

        if let Some(record) = &record {
            info!(
                "trip {} finished: {:.0} m, {} incidents",
                record.trip_id,
                record.total_distance,
                record.speeding_incidents.len()
            );
        }
        record
    }

    /// Zero the live trip statistics without stopping
    pub fn reset_trip(&mut self, now_ms: i64) {
        self.tracker.reset(now_ms);
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.alarm.toggle_mute()
    }

    pub fn toggle_announcements(&mut self) -> bool {
        self.zone.toggle()
    }

    pub fn set_unit(&mut self, unit: SpeedUnit) {
        self.unit = unit;
        self.zone.set_unit(unit);
    }

    pub fn toggle_unit(&mut self) -> SpeedUnit {
        self.set_unit(self.unit.toggled());
        self.unit
    }

    /// Enabling speaks the current speed right away and then periodically
    pub fn set_hands_free(&mut self, enabled: bool, now_ms: i64, sink: &mut dyn AudioSink) {
        self.hands_free = enabled;
        if enabled && self.is_tracking() {
            self.speak_readout(sink);
            self.readout.arm(now_ms, self.config.readout_interval_ms);
        } else {
            self.readout.cancel();
        }
    }

    pub fn dismiss_break(&mut self) {
        self.breaks.dismiss();
    }

    /// Forget the trip record and the zone baselines
    pub fn clear(&mut self) {
        self.trip.clear();
        self.zone.clear();
        self.road = RoadInfo::unknown();
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let motion = self.tracker.state().clone();
        LiveSnapshot {
            display_speed: self.unit.from_kmh(motion.speed_kmh),
            display_speed_limit: self.road.speed_limit_in(self.unit),
            over_by_kmh: over_limit(motion.speed_kmh, self.road.speed_limit),
            motion,
            road: self.road.clone(),
            alarm: self.alarm.state().clone(),
            turn: self.turn.state().clone(),
            zone: self.zone.state(),
            breaks: self.breaks.state().clone(),
            unit: self.unit,
            hands_free: self.hands_free,
        }
    }

    /// Eco report using the local time zone for time-of-day fatigue terms
    pub fn eco_report(&self, now_ms: i64) -> EcoReport {
        self.eco.report(&local_time(now_ms))
    }

    pub fn eco_report_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> EcoReport {
        self.eco.report(now)
    }

    pub fn trip_record(&self) -> Option<&TripRecord> {
        self.trip.record()
    }

    /// Whether any component still has a timer armed
    pub fn has_pending_timers(&self) -> bool {
        self.alarm.has_pending()
            || self.turn.has_pending()
            || self.zone.has_pending()
            || self.breaks.has_pending()
            || self.readout.is_armed()
    }
}

/// Over-limit magnitude (km/h); zero without a positive limit
fn over_limit(speed_kmh: f64, limit_kmh: Option<f64>) -> f64 {
    match limit_kmh {
        Some(limit) if limit > 0.0 && speed_kmh > limit => speed_kmh - limit,
        _ => 0.0,
    }
}

fn local_time(now_ms: i64) -> DateTime<Local> {
    Utc.timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_default()
        .with_timezone(&Local)
}
