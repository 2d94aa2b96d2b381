//! Error types for DriveSense

use thiserror::Error;

/// Errors that can occur while tracking or computing trip signals
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Position source is not supported on this device")]
    PositionUnsupported,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location information is unavailable")]
    PositionUnavailable,

    #[error("Invalid position sample: {0}")]
    InvalidSample(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Speed limit lookup failed: {0}")]
    LookupFailed(String),

    #[error("Tracking has not been started")]
    NotTracking,
}

/// Errors reported by an audio or speech sink.
///
/// These never propagate past the component that invoked the sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Audio output is not supported")]
    Unsupported,

    #[error("Audio output failed: {0}")]
    Failed(String),
}
