//! DriveSense - On-device driving telemetry engine
//!
//! DriveSense turns a stream of position fixes and road metadata into live
//! trip kinematics, eco-driving and fatigue scores, tiered over-speed alarms,
//! sharp-turn warnings, zone announcements and a persisted trip record.
//! Everything is tick-driven: the caller supplies the clock and an audio sink,
//! and components never spawn threads or read the wall clock.
//!
//! ## Modules
//!
//! - **Session**: [`DriveSession`] fans each fix out to every component
//! - **Kinematics**: distance, speed statistics and trip duration
//! - **Eco**: acceleration, braking, cornering and idle scoring
//! - **Alarms**: over-speed tiers, turn warnings, zone announcements and break reminders
//! - **Trip**: speeding incidents and the final [`TripRecord`]

pub mod alarm;
pub mod config;
pub mod drowsy;
pub mod eco;
pub mod effects;
pub mod error;
pub mod kinematics;
pub mod road;
pub mod session;
pub mod timer;
pub mod trip;
pub mod turn;
pub mod types;
pub mod zone;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use effects::{AudioSink, NullSink, RecordingSink};
pub use error::{SinkError, TelemetryError};
pub use session::{DriveSession, LiveSnapshot};
pub use trip::TripRecord;

pub use eco::{EcoReport, EcoSnapshot};
pub use road::{RoadInfo, SpeedLimitLookup};
pub use types::{PositionSample, SourceAvailability, SpeedUnit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "drivesense";
