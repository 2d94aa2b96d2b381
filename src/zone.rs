//! Zone announcements
//!
//! Voices school-zone edges and speed-limit changes after a short settle
//! delay. Both channels share a single pending slot, so a newer announcement
//! replaces one that has not been spoken yet.

use crate::config::ZonePolicy;
use crate::effects::{speak_best_effort, AudioSink, Utterance};
use crate::timer::Timer;
use crate::types::SpeedUnit;
use log::debug;
use serde::{Deserialize, Serialize};

/// Consumer-facing announcer state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    /// Most recently spoken speed limit (km/h)
    pub last_announced: Option<f64>,
    pub in_school_zone: bool,
    pub enabled: bool,
    pub unit: SpeedUnit,
    /// Text waiting for its settle delay to pass
    pub pending: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingAnnouncement {
    text: String,
    limit_kmh: Option<f64>,
}

/// Debounced zone-change announcer
#[derive(Debug, Clone)]
pub struct ZoneAnnouncer {
    policy: ZonePolicy,
    enabled: bool,
    unit: SpeedUnit,
    previous_limit: Option<f64>,
    previous_school_zone: bool,
    last_announced: Option<f64>,
    pending: Option<PendingAnnouncement>,
    timer: Timer,
}

impl Default for ZoneAnnouncer {
    fn default() -> Self {
        Self::new(ZonePolicy::default(), SpeedUnit::default())
    }
}

impl ZoneAnnouncer {
    pub fn new(policy: ZonePolicy, unit: SpeedUnit) -> Self {
        Self {
            policy,
            enabled: true,
            unit,
            previous_limit: None,
            previous_school_zone: false,
            last_announced: None,
            pending: None,
            timer: Timer::new(),
        }
    }

    /// Observe the latest road metadata
    pub fn observe(&mut self, speed_limit_kmh: Option<f64>, is_school_zone: bool, now_ms: i64) {
        if is_school_zone != self.previous_school_zone {
            self.previous_school_zone = is_school_zone;
            let text = if is_school_zone {
                "Caution. School zone."
            } else {
                "Leaving school zone."
            };
            self.schedule(text.to_string(), None, self.policy.school_settle_ms, now_ms);
        }

        let Some(limit) = speed_limit_kmh else {
            return;
        };
        match self.previous_limit {
            None => {
                self.previous_limit = Some(limit);
            }
            Some(previous) if previous != limit => {
                self.previous_limit = Some(limit);
                let text = format!(
                    "Speed limit now {} {}",
                    self.unit.from_kmh(limit).round(),
                    self.unit.spoken()
                );
                self.schedule(text, Some(limit), self.policy.limit_settle_ms, now_ms);
            }
            Some(_) => {}
        }
    }

    fn schedule(&mut self, text: String, limit_kmh: Option<f64>, delay_ms: i64, now_ms: i64) {
        if !self.enabled {
            return;
        }
        debug!("announcement armed in {} ms: {}", delay_ms, text);
        self.pending = Some(PendingAnnouncement { text, limit_kmh });
        self.timer.arm(now_ms, delay_ms);
    }

    /// Speak the pending announcement once its settle delay has passed
    pub fn advance(&mut self, now_ms: i64, sink: &mut dyn AudioSink) {
        if self.timer.fire_if_due(now_ms).is_none() {
            return;
        }
        let Some(announcement) = self.pending.take() else {
            return;
        };
        debug!("announcing: {}", announcement.text);
        speak_best_effort(sink, &Utterance::new(announcement.text).interrupting());
        if announcement.limit_kmh.is_some() {
            self.last_announced = announcement.limit_kmh;
        }
    }

    /// Enabling never replays transitions observed while disabled
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.cancel_pending();
        }
    }

    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    pub fn set_unit(&mut self, unit: SpeedUnit) {
        self.unit = unit;
    }

    pub fn cancel_pending(&mut self) {
        self.timer.cancel();
        self.pending = None;
    }

    /// Forget the baselines so the next observation is silent
    pub fn clear(&mut self) {
        self.cancel_pending();
        self.previous_limit = None;
        self.previous_school_zone = false;
        self.last_announced = None;
    }

    pub fn has_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> ZoneState {
        ZoneState {
            last_announced: self.last_announced,
            in_school_zone: self.previous_school_zone,
            enabled: self.enabled,
            unit: self.unit,
            pending: self.pending.as_ref().map(|p| p.text.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Effect, RecordingSink};

    #[test]
    fn test_school_zone_flicker_announces_final_state() {
        let mut zone = ZoneAnnouncer::default();
        let mut sink = RecordingSink::new();

        zone.observe(None, true, 0);
        zone.advance(100, &mut sink);
        zone.observe(None, false, 100);
        zone.advance(200, &mut sink);
        zone.observe(None, true, 200);
        zone.advance(499, &mut sink);
        assert!(sink.spoken().is_empty());

        zone.advance(500, &mut sink);
        assert_eq!(sink.spoken(), vec!["Caution. School zone."]);
        assert!(zone.state().in_school_zone);
    }

    #[test]
    fn test_first_limit_is_silent_baseline() {
        let mut zone = ZoneAnnouncer::default();
        let mut sink = RecordingSink::new();

        zone.observe(Some(50.0), false, 0);
        zone.advance(1_000, &mut sink);
        assert!(sink.spoken().is_empty());
        assert!(!zone.has_pending());

        zone.observe(Some(50.0), false, 1_000);
        zone.observe(None, false, 1_100);
        assert!(!zone.has_pending());

        zone.observe(Some(80.0), false, 2_000);
        zone.advance(2_499, &mut sink);
        assert!(sink.spoken().is_empty());
        zone.advance(2_500, &mut sink);
        assert_eq!(sink.spoken(), vec!["Speed limit now 80 kilometers per hour"]);
        assert_eq!(zone.state().last_announced, Some(80.0));
    }

    #[test]
    fn test_announcements_interrupt() {
        let mut zone = ZoneAnnouncer::default();
        let mut sink = RecordingSink::new();
        zone.observe(None, true, 0);
        zone.advance(300, &mut sink);

        match &sink.effects()[0] {
            Effect::Speech { utterance } => assert!(utterance.interrupt),
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_newer_change_supersedes_pending() {
        let mut zone = ZoneAnnouncer::default();
        let mut sink = RecordingSink::new();

        zone.observe(Some(50.0), false, 0);
        zone.observe(Some(50.0), true, 1_000);
        zone.observe(Some(30.0), true, 1_100);
        zone.advance(5_000, &mut sink);

        assert_eq!(sink.spoken(), vec!["Speed limit now 30 kilometers per hour"]);
    }

    #[test]
    fn test_mph_announcement() {
        let mut zone = ZoneAnnouncer::new(ZonePolicy::default(), SpeedUnit::Mph);
        let mut sink = RecordingSink::new();

        zone.observe(Some(50.0), false, 0);
        zone.observe(Some(100.0), false, 100);
        zone.advance(600, &mut sink);
        assert_eq!(sink.spoken(), vec!["Speed limit now 62 miles per hour"]);
    }

    #[test]
    fn test_disable_cancels_and_does_not_replay() {
        let mut zone = ZoneAnnouncer::default();
        let mut sink = RecordingSink::new();

        zone.observe(Some(50.0), false, 0);
        zone.observe(Some(70.0), false, 100);
        assert!(!zone.toggle());
        assert!(!zone.has_pending());

        // Changes while disabled update the baseline silently
        zone.observe(Some(90.0), true, 200);
        assert!(zone.toggle());
        zone.advance(5_000, &mut sink);
        assert!(sink.spoken().is_empty());

        zone.observe(Some(90.0), true, 6_000);
        zone.advance(7_000, &mut sink);
        assert!(sink.spoken().is_empty());
    }

    #[test]
    fn test_clear_forgets_baseline() {
        let mut zone = ZoneAnnouncer::default();
        let mut sink = RecordingSink::new();

        zone.observe(Some(50.0), false, 0);
        zone.clear();
        zone.observe(Some(80.0), false, 100);
        zone.advance(1_000, &mut sink);
        assert!(sink.spoken().is_empty());
    }
}
