//! Cancellable virtual-time timers
//!
//! Components never spawn threads or register callbacks. Instead each scheduled
//! continuation (an alarm cycle, a turn cooldown, a debounced announcement) is a
//! [`Timer`] slot holding an optional deadline. The owner checks it from its
//! `advance(now_ms, ..)` method, which lets tests drive time deterministically.

use serde::{Deserialize, Serialize};

/// A single-shot timer slot. Arming an armed timer supersedes the old deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    deadline_ms: Option<i64>,
}

impl Timer {
    /// Create a disarmed timer
    pub const fn new() -> Self {
        Self { deadline_ms: None }
    }

    /// Arm the timer to fire `delay_ms` after `now_ms`
    pub fn arm(&mut self, now_ms: i64, delay_ms: i64) {
        self.deadline_ms = Some(now_ms.saturating_add(delay_ms.max(0)));
    }

    /// Disarm the timer. Cancelling a disarmed timer is a no-op.
    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn deadline(&self) -> Option<i64> {
        self.deadline_ms
    }

    /// If the deadline has been reached, disarm and return the deadline it fired at.
    pub fn fire_if_due(&mut self, now_ms: i64) -> Option<i64> {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                Some(deadline)
            }
            _ => None,
        }
    }
}
