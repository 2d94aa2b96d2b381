//! Over-speed alarm
//!
//! A four-tier state machine driven by how far the vehicle is over the posted
//! limit. Each non-none tier owns a self-rescheduling cycle of tones (and, for
//! the upper tiers, a visual flash pulse). Only one cycle is ever armed.

use crate::config::AlarmPolicy;
use crate::effects::{play_best_effort, speak_best_effort, AudioSink, Tone, Utterance};
use crate::timer::Timer;
use log::debug;
use serde::{Deserialize, Serialize};

/// Alarm severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmTier {
    #[default]
    None,
    Mild,
    Moderate,
    Aggressive,
}

impl AlarmTier {
    /// Tier for a given over-limit magnitude (km/h)
    pub fn from_over_by(over_by: f64, policy: &AlarmPolicy) -> Self {
        if over_by >= policy.aggressive_over_kmh {
            AlarmTier::Aggressive
        } else if over_by >= policy.moderate_over_kmh {
            AlarmTier::Moderate
        } else if over_by >= policy.mild_over_kmh {
            AlarmTier::Mild
        } else {
            AlarmTier::None
        }
    }

    fn period_ms(self, policy: &AlarmPolicy) -> Option<i64> {
        match self {
            AlarmTier::None => None,
            AlarmTier::Mild => Some(policy.mild_period_ms),
            AlarmTier::Moderate => Some(policy.moderate_period_ms),
            AlarmTier::Aggressive => Some(policy.aggressive_period_ms),
        }
    }

    fn tone(self) -> Option<Tone> {
        match self {
            AlarmTier::None => None,
            AlarmTier::Mild => Some(Tone::alarm_mild()),
            AlarmTier::Moderate => Some(Tone::alarm_moderate()),
            AlarmTier::Aggressive => Some(Tone::alarm_aggressive()),
        }
    }

    fn flashes(self) -> bool {
        matches!(self, AlarmTier::Moderate | AlarmTier::Aggressive)
    }
}

/// Consumer-facing alarm state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmState {
    pub tier: AlarmTier,
    pub muted: bool,
    /// True for a short interval after each moderate/aggressive pulse
    pub flashing: bool,
    /// The aggressive spoken warning has fired in the current escalation
    pub voice_spoken: bool,
}

/// Tiered over-speed alarm controller
#[derive(Debug, Clone)]
pub struct AlarmTierController {
    policy: AlarmPolicy,
    state: AlarmState,
    cycle: Timer,
    flash: Timer,
}

impl Default for AlarmTierController {
    fn default() -> Self {
        Self::new(AlarmPolicy::default())
    }
}

impl AlarmTierController {
    pub fn new(policy: AlarmPolicy) -> Self {
        Self {
            policy,
            state: AlarmState::default(),
            cycle: Timer::new(),
            flash: Timer::new(),
        }
    }

    /// Recompute the tier from the current over-limit magnitude (km/h, ≥ 0)
    pub fn update(&mut self, over_by: f64, now_ms: i64, sink: &mut dyn AudioSink) -> AlarmTier {
        let tier = AlarmTier::from_over_by(over_by, &self.policy);

        if self.state.muted || tier == AlarmTier::None {
            self.halt_cycle();
            if tier == AlarmTier::None {
                self.state.voice_spoken = false;
            }
            return self.state.tier;
        }

        if tier == self.state.tier && self.cycle.is_armed() {
            return tier;
        }

        debug!("alarm tier {:?} -> {:?} (over by {:.1})", self.state.tier, tier, over_by);
        self.halt_cycle();
        self.state.tier = tier;

        if tier == AlarmTier::Aggressive && !self.state.voice_spoken {
            let warning = Utterance::new(self.policy.warning_text.clone()).with_rate(1.1);
            self.state.voice_spoken = speak_best_effort(sink, &warning);
        }

        self.pulse(now_ms, sink);
        tier
    }

    /// Expire the flash and fire at most one due cycle pulse.
    ///
    /// Pulses missed during a clock gap are dropped; the next deadline stays
    /// aligned to the tier period.
    pub fn advance(&mut self, now_ms: i64, sink: &mut dyn AudioSink) {
        if self.flash.fire_if_due(now_ms).is_some() {
            self.state.flashing = false;
        }

        let Some(fired) = self.cycle.fire_if_due(now_ms) else {
            return;
        };
        let Some(period) = self.state.tier.period_ms(&self.policy) else {
            return;
        };
        let period = period.max(1);
        let missed = now_ms.saturating_sub(fired) / period;
        if missed > 0 {
            debug!("alarm skipped {} missed pulses", missed);
        }
        let slot = fired.saturating_add(missed.saturating_mul(period));

        self.pulse(slot, sink);
        if self.state.flashing {
            self.flash.arm(now_ms, self.policy.flash_ms);
        }
    }

    /// Play one cycle pulse and schedule the next
    fn pulse(&mut self, at_ms: i64, sink: &mut dyn AudioSink) {
        let tier = self.state.tier;
        let (Some(tone), Some(period)) = (tier.tone(), tier.period_ms(&self.policy)) else {
            return;
        };

        play_best_effort(sink, &tone);
        if tier.flashes() {
            self.state.flashing = true;
            self.flash.arm(at_ms, self.policy.flash_ms);
        }
        self.cycle.arm(at_ms, period.max(1));
    }

    fn halt_cycle(&mut self) {
        self.cycle.cancel();
        self.flash.cancel();
        self.state.tier = AlarmTier::None;
        self.state.flashing = false;
    }

    /// Silence the alarm and release every latch
    pub fn stop(&mut self) {
        self.halt_cycle();
        self.state.voice_spoken = false;
    }

    /// Muting stops the alarm; unmuting takes effect on the next update
    pub fn set_muted(&mut self, muted: bool) {
        self.state.muted = muted;
        if muted {
            self.stop();
        }
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.set_muted(!self.state.muted);
        self.state.muted
    }

    pub fn state(&self) -> &AlarmState {
        &self.state
    }

    pub fn tier(&self) -> AlarmTier {
        self.state.tier
    }

    /// Whether a cycle continuation is scheduled
    pub fn is_cycling(&self) -> bool {
        self.cycle.is_armed()
    }

    /// Whether any timer (cycle or flash) is armed
    pub fn has_pending(&self) -> bool {
        self.cycle.is_armed() || self.flash.is_armed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::FailingSink;
    use crate::effects::RecordingSink;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tier_thresholds() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        assert_eq!(alarm.update(4.0, 0, &mut sink), AlarmTier::None);
        assert_eq!(alarm.update(7.0, 100, &mut sink), AlarmTier::Mild);
        assert_eq!(alarm.update(12.0, 200, &mut sink), AlarmTier::Moderate);
        assert_eq!(alarm.update(25.0, 300, &mut sink), AlarmTier::Aggressive);
        assert_eq!(alarm.update(0.0, 400, &mut sink), AlarmTier::None);
        assert!(!alarm.is_cycling());
        assert!(!alarm.has_pending());
    }

    #[test]
    fn test_same_tier_is_noop() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(7.0, 0, &mut sink);
        alarm.update(8.0, 500, &mut sink);
        alarm.update(6.0, 1_000, &mut sink);
        assert_eq!(sink.tone_names(), vec!["alarm_mild"]);
    }

    #[test]
    fn test_advance_repeats_at_tier_period() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(7.0, 0, &mut sink);
        alarm.advance(2_999, &mut sink);
        assert_eq!(sink.tone_names().len(), 1);

        alarm.advance(3_000, &mut sink);
        assert_eq!(sink.tone_names().len(), 2);

        // One pulse for a gap spanning several periods, next slot stays aligned
        alarm.advance(9_500, &mut sink);
        assert_eq!(sink.tone_names().len(), 3);
        alarm.advance(11_999, &mut sink);
        assert_eq!(sink.tone_names().len(), 3);
        alarm.advance(12_000, &mut sink);
        assert_eq!(sink.tone_names().len(), 4);
    }

    #[test]
    fn test_long_gap_plays_single_pulse() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(25.0, 0, &mut sink);
        sink.clear();

        alarm.advance(3_600_000, &mut sink);
        assert_eq!(sink.tone_names(), vec!["alarm_aggressive"]);
        assert!(alarm.state().flashing);
        assert!(sink.spoken().is_empty());

        alarm.advance(3_600_150, &mut sink);
        assert!(!alarm.state().flashing);
        alarm.advance(3_601_499, &mut sink);
        assert_eq!(sink.tone_names().len(), 1);
        alarm.advance(3_601_500, &mut sink);
        assert_eq!(sink.tone_names().len(), 2);
    }

    #[test]
    fn test_tier_change_restarts_cycle() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(7.0, 0, &mut sink);
        alarm.update(12.0, 1_000, &mut sink);
        // The mild continuation at 3000 is gone; moderate repeats at 3000 from 1000
        alarm.advance(2_999, &mut sink);
        assert_eq!(sink.tone_names(), vec!["alarm_mild", "alarm_moderate"]);
        alarm.advance(3_000, &mut sink);
        assert_eq!(
            sink.tone_names(),
            vec!["alarm_mild", "alarm_moderate", "alarm_moderate"]
        );
    }

    #[test]
    fn test_flash_pulses() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(12.0, 0, &mut sink);
        assert!(alarm.state().flashing);
        alarm.advance(149, &mut sink);
        assert!(alarm.state().flashing);
        alarm.advance(150, &mut sink);
        assert!(!alarm.state().flashing);
        alarm.advance(2_000, &mut sink);
        assert!(alarm.state().flashing);

        // Mild never flashes
        alarm.update(6.0, 2_100, &mut sink);
        assert!(!alarm.state().flashing);
    }

    #[test]
    fn test_aggressive_voice_once_per_escalation() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(25.0, 0, &mut sink);
        alarm.update(12.0, 1_000, &mut sink);
        alarm.update(25.0, 2_000, &mut sink);
        assert_eq!(sink.spoken(), vec!["Reduce speed."]);

        alarm.update(0.0, 3_000, &mut sink);
        alarm.update(30.0, 4_000, &mut sink);
        assert_eq!(sink.spoken(), vec!["Reduce speed.", "Reduce speed."]);
    }

    #[test]
    fn test_mute_cancels_and_blocks() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(25.0, 0, &mut sink);
        assert!(alarm.toggle_mute());
        assert_eq!(alarm.tier(), AlarmTier::None);
        assert!(!alarm.has_pending());

        sink.clear();
        alarm.update(25.0, 1_000, &mut sink);
        alarm.advance(10_000, &mut sink);
        assert!(sink.effects().is_empty());

        assert!(!alarm.toggle_mute());
        alarm.update(25.0, 11_000, &mut sink);
        assert_eq!(alarm.tier(), AlarmTier::Aggressive);
        assert_eq!(sink.spoken(), vec!["Reduce speed."]);
    }

    #[test]
    fn test_stop_prevents_late_pulses() {
        let mut alarm = AlarmTierController::default();
        let mut sink = RecordingSink::new();

        alarm.update(12.0, 0, &mut sink);
        alarm.stop();
        sink.clear();
        alarm.advance(60_000, &mut sink);
        assert!(sink.effects().is_empty());
        assert_eq!(alarm.state(), &AlarmState::default());
    }

    #[test]
    fn test_sink_failure_does_not_latch_voice() {
        let mut alarm = AlarmTierController::default();
        let mut sink = FailingSink;

        assert_eq!(alarm.update(25.0, 0, &mut sink), AlarmTier::Aggressive);
        assert!(!alarm.state().voice_spoken);
        assert!(alarm.is_cycling());
    }
}
