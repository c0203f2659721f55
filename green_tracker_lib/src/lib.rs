pub mod location_sample;
pub mod transport_mode;
pub mod geodesic;
pub mod emissions;
pub mod snapshot;
pub mod trip_session;
pub mod comms;
#[cfg(feature = "tokio")]
pub mod frame_reader;
pub mod estimator;
pub mod history;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// The platform offers no location capability, or permission was denied.
    LocationUnavailable(String),
    /// The location stream failed mid-trip.
    LocationStream(String),
    /// A trip is already running or paused on this session.
    SessionActive,
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::LocationUnavailable(reason) => write!(f, "Location unavailable: {reason}"),
            TrackingError::LocationStream(reason) => write!(f, "Location stream error: {reason}"),
            TrackingError::SessionActive => write!(f, "A trip is already in progress, stop it first"),
        }
    }
}

impl std::error::Error for TrackingError {}

/// Rounds to a fixed number of decimals. Used at serialization boundaries only.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
