//! Eco-driving engine
//!
//! This module consumes per-tick speed, speed limit, timestamp and heading and
//! accumulates acceleration, braking, cornering, idle and speed-discipline
//! statistics. Scores are projected on demand and never stored.
//!
//! Flow: tick → EcoAccumulator → (on demand) scoring → EcoReport

pub mod accumulator;
pub mod scorer;
pub mod scoring;
pub mod types;

pub use accumulator::EcoAccumulator;
pub use scorer::BehaviorScorer;
pub use types::{EcoReport, EcoSnapshot};
