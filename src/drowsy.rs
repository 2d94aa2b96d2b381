//! Break reminder
//!
//! Suggests a rest stop after a long stretch of continuous driving, then
//! repeats at a shorter interval until tracking stops.

use crate::config::BreakPolicy;
use crate::effects::{play_best_effort, speak_best_effort, AudioSink, Tone, Utterance};
use crate::timer::Timer;
use log::debug;
use serde::{Deserialize, Serialize};

/// Consumer-facing break reminder state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakState {
    /// Elapsed driving time at the last clock update (ms)
    pub driving_time_ms: i64,
    pub should_take_break: bool,
    pub breaks_dismissed: u32,
    /// Driving time at which the next reminder fires (ms)
    pub next_alert_ms: i64,
}

/// Long-drive break reminder
#[derive(Debug, Clone)]
pub struct BreakReminder {
    policy: BreakPolicy,
    start_ms: Option<i64>,
    state: BreakState,
    timer: Timer,
}

impl Default for BreakReminder {
    fn default() -> Self {
        Self::new(BreakPolicy::default())
    }
}

impl BreakReminder {
    pub fn new(policy: BreakPolicy) -> Self {
        Self {
            policy,
            start_ms: None,
            state: BreakState::default(),
            timer: Timer::new(),
        }
    }

    pub fn start(&mut self, now_ms: i64) {
        self.start_ms = Some(now_ms);
        self.state = BreakState {
            next_alert_ms: self.policy.first_alert_ms,
            ..BreakState::default()
        };
        self.timer.arm(now_ms, self.policy.first_alert_ms);
    }

    pub fn stop(&mut self) {
        self.start_ms = None;
        self.timer.cancel();
    }

    /// Update the driving clock and fire a due reminder
    pub fn advance(&mut self, now_ms: i64, sink: &mut dyn AudioSink) {
        let Some(start) = self.start_ms else {
            return;
        };
        self.state.driving_time_ms = now_ms.saturating_sub(start).max(0);

        if self.timer.fire_if_due(now_ms).is_none() {
            return;
        }

        let elapsed = self.state.driving_time_ms;
        debug!("break reminder after {} ms of driving", elapsed);
        self.state.should_take_break = true;
        play_best_effort(sink, &Tone::break_chime());
        let text = format!(
            "You've been driving for {}. Consider taking a break.",
            describe_duration(elapsed)
        );
        speak_best_effort(sink, &Utterance::new(text).with_rate(0.9));

        self.state.next_alert_ms = elapsed.saturating_add(self.policy.repeat_ms);
        self.timer.arm(start, self.state.next_alert_ms);
    }

    /// Acknowledge the reminder and push the next one further out
    pub fn dismiss(&mut self) {
        self.state.should_take_break = false;
        self.state.breaks_dismissed += 1;
        self.state.next_alert_ms = self.state.next_alert_ms.saturating_add(self.policy.repeat_ms);
        if let Some(start) = self.start_ms {
            self.timer.arm(start, self.state.next_alert_ms);
        }
    }

    pub fn state(&self) -> &BreakState {
        &self.state
    }

    pub fn has_pending(&self) -> bool {
        self.timer.is_armed()
    }
}

/// "2 hours and 5 minutes", "1 hour", "45 minutes"
fn describe_duration(elapsed_ms: i64) -> String {
    let total_minutes = (elapsed_ms as f64 / 60_000.0).round() as i64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("{} {}", n, unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };

    match (hours, minutes) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{} and {}", plural(h, "hour"), plural(m, "minute")),
    }
}
