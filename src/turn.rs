//! Turn detection
//!
//! Keeps a short sliding window of headings and compares its oldest and newest
//! samples. Large changes trigger a sharp-turn warning followed by a cooldown;
//! moderate changes trigger a mild cue that clears itself.

use crate::config::TurnPolicy;
use crate::effects::{play_best_effort, speak_best_effort, AudioSink, Tone, Utterance};
use crate::timer::Timer;
use crate::types::normalize_heading_delta;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Turn severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSeverity {
    Mild,
    Sharp,
}

/// A heading observation in the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    pub heading: f64,
    pub timestamp: i64,
}

/// Consumer-facing turn state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    pub is_turning: bool,
    pub severity: Option<TurnSeverity>,
    /// A sharp warning fired recently; new warnings are suppressed
    pub cooldown_active: bool,
    pub voice_spoken: bool,
}

/// Sliding-window turn classifier
#[derive(Debug, Clone)]
pub struct TurnDetector {
    policy: TurnPolicy,
    window: VecDeque<HeadingSample>,
    state: TurnState,
    cooldown: Timer,
    mild_clear: Timer,
}

impl Default for TurnDetector {
    fn default() -> Self {
        Self::new(TurnPolicy::default())
    }
}

impl TurnDetector {
    pub fn new(policy: TurnPolicy) -> Self {
        Self {
            policy,
            window: VecDeque::new(),
            state: TurnState::default(),
            cooldown: Timer::new(),
            mild_clear: Timer::new(),
        }
    }

    /// Add a heading sample and re-classify the window
    pub fn update_heading(
        &mut self,
        heading_deg: f64,
        speed_kmh: Option<f64>,
        now_ms: i64,
        sink: &mut dyn AudioSink,
    ) -> &TurnState {
        self.window.push_back(HeadingSample {
            heading: heading_deg,
            timestamp: now_ms,
        });
        let cutoff = now_ms.saturating_sub(self.policy.window_ms);
        while self.window.front().is_some_and(|s| s.timestamp < cutoff) {
            self.window.pop_front();
        }

        // Heading is unreliable at low speed
        if speed_kmh.map_or(true, |v| v < self.policy.min_speed_kmh) {
            self.clear_display();
            return &self.state;
        }

        if let Some(severity) = self.classify() {
            if !self.state.cooldown_active {
                self.trigger(severity, now_ms, sink);
            }
        }
        &self.state
    }

    fn classify(&self) -> Option<TurnSeverity> {
        let (oldest, newest) = match (self.window.front(), self.window.back()) {
            (Some(o), Some(n)) if self.window.len() >= 2 => (o, n),
            _ => return None,
        };
        let span_ms = newest.timestamp.saturating_sub(oldest.timestamp);
        if span_ms < self.policy.min_span_ms || span_ms > self.policy.window_ms {
            return None;
        }

        let change = normalize_heading_delta(newest.heading - oldest.heading).abs();
        if change >= self.policy.sharp_deg {
            Some(TurnSeverity::Sharp)
        } else if change >= self.policy.mild_deg {
            Some(TurnSeverity::Mild)
        } else {
            None
        }
    }

    fn trigger(&mut self, severity: TurnSeverity, now_ms: i64, sink: &mut dyn AudioSink) {
        debug!("{:?} turn detected", severity);
        self.state.is_turning = true;
        self.state.severity = Some(severity);
        play_best_effort(sink, &Tone::turn_warning());

        match severity {
            TurnSeverity::Sharp => {
                self.state.cooldown_active = true;
                self.mild_clear.cancel();
                self.cooldown.arm(now_ms, self.policy.cooldown_ms);
                if !self.state.voice_spoken {
                    let warning = Utterance::new(self.policy.warning_text.clone()).with_rate(1.2);
                    self.state.voice_spoken = speak_best_effort(sink, &warning);
                }
            }
            TurnSeverity::Mild => {
                self.mild_clear.arm(now_ms, self.policy.mild_clear_ms);
            }
        }
    }

    /// Expire the cooldown and the mild display
    pub fn advance(&mut self, now_ms: i64, _sink: &mut dyn AudioSink) {
        if self.cooldown.fire_if_due(now_ms).is_some() {
            debug!("turn cooldown released");
            self.state.cooldown_active = false;
            self.state.voice_spoken = false;
            self.clear_display();
        }
        if self.mild_clear.fire_if_due(now_ms).is_some() {
            self.clear_display();
        }
    }

    fn clear_display(&mut self) {
        self.state.is_turning = false;
        self.state.severity = None;
    }

    /// Cancel both timers and forget the window
    pub fn stop(&mut self) {
        self.cooldown.cancel();
        self.mild_clear.cancel();
        self.window.clear();
        self.state = TurnState::default();
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn window(&self) -> impl Iterator<Item = &HeadingSample> {
        self.window.iter()
    }

    pub fn has_pending(&self) -> bool {
        self.cooldown.is_armed() || self.mild_clear.is_armed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::RecordingSink;

    fn feed(detector: &mut TurnDetector, sink: &mut RecordingSink, samples: &[(f64, i64)], speed: f64) {
        for (heading, t) in samples {
            detector.update_heading(*heading, Some(speed), *t, sink);
        }
    }

    #[test]
    fn test_sharp_turn() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (50.0, 1_500)], 40.0);

        assert_eq!(detector.state().severity, Some(TurnSeverity::Sharp));
        assert!(detector.state().is_turning);
        assert_eq!(sink.tone_names(), vec!["turn_warning"]);
        assert_eq!(sink.spoken(), vec!["Sharp turn ahead"]);
    }

    #[test]
    fn test_mild_turn_clears_itself() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (30.0, 1_500)], 40.0);

        assert_eq!(detector.state().severity, Some(TurnSeverity::Mild));
        assert_eq!(sink.tone_names(), vec!["turn_warning"]);
        assert!(sink.spoken().is_empty());

        detector.advance(4_499, &mut sink);
        assert!(detector.state().is_turning);
        detector.advance(4_500, &mut sink);
        assert!(!detector.state().is_turning);
        assert_eq!(detector.state().severity, None);
    }

    #[test]
    fn test_no_turn_at_low_speed() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (50.0, 1_500)], 10.0);

        assert_eq!(detector.state(), &TurnState::default());
        assert!(sink.effects().is_empty());
        // Window is still maintained
        assert_eq!(detector.window().count(), 2);
    }

    #[test]
    fn test_missing_speed_counts_as_slow() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        detector.update_heading(0.0, None, 0, &mut sink);
        detector.update_heading(90.0, None, 1_000, &mut sink);
        assert!(!detector.state().is_turning);
    }

    #[test]
    fn test_short_span_not_classified() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (60.0, 400)], 50.0);
        assert!(!detector.state().is_turning);
    }

    #[test]
    fn test_old_samples_evicted() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        // The 0° sample is more than 3 s old when 50° arrives
        feed(&mut detector, &mut sink, &[(0.0, 0), (40.0, 2_000), (50.0, 3_500)], 40.0);

        assert_eq!(detector.window().count(), 2);
        assert!(sink.spoken().is_empty());
    }

    #[test]
    fn test_cooldown_blocks_then_releases() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (50.0, 1_500)], 40.0);
        assert!(detector.state().cooldown_active);

        // A mild change inside the cooldown is suppressed
        feed(&mut detector, &mut sink, &[(80.0, 4_000)], 40.0);
        assert_eq!(sink.tone_names().len(), 1);

        detector.advance(6_500, &mut sink);
        assert!(!detector.state().cooldown_active);
        assert!(!detector.state().voice_spoken);
        assert!(!detector.state().is_turning);

        feed(&mut detector, &mut sink, &[(110.0, 7_000)], 40.0);
        assert_eq!(detector.state().severity, Some(TurnSeverity::Mild));
        assert_eq!(sink.tone_names().len(), 2);
    }

    #[test]
    fn test_sharp_supersedes_pending_mild_clear() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (30.0, 1_500)], 40.0);
        feed(&mut detector, &mut sink, &[(50.0, 2_500)], 40.0);
        assert_eq!(detector.state().severity, Some(TurnSeverity::Sharp));

        detector.advance(4_500, &mut sink);
        assert_eq!(detector.state().severity, Some(TurnSeverity::Sharp));
        detector.advance(7_500, &mut sink);
        assert!(!detector.state().is_turning);
    }

    #[test]
    fn test_stop_resets() {
        let mut detector = TurnDetector::default();
        let mut sink = RecordingSink::new();
        feed(&mut detector, &mut sink, &[(0.0, 0), (50.0, 1_500)], 40.0);
        detector.stop();

        assert!(!detector.has_pending());
        assert_eq!(detector.window().count(), 0);
        assert_eq!(detector.state(), &TurnState::default());
    }
}
