use serde::{Deserialize, Serialize};

use crate::{location_sample::LocationSample, round_to, transport_mode::TransportMode};

/// Immutable record of one trip, materialized at stop (or at a mid-trip checkpoint,
/// in which case `stopped_at_ms` is absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub distance_meters: f64,
    pub duration_sec: u64,
    #[serde(rename = "avgSpeed")]
    pub avg_speed_mps: f64,
    pub mode: TransportMode,
    /// Rounded to 4 decimals.
    #[serde(rename = "kgCO2")]
    pub kg_co2: f64,
    /// Rounded to 2 decimals.
    pub cost: f64,
    #[serde(rename = "points", default)]
    pub samples: Vec<LocationSample>,
    #[serde(rename = "startedAt", default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(rename = "stoppedAt", default, skip_serializing_if = "Option::is_none")]
    pub stopped_at_ms: Option<i64>,
}

impl Snapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        distance_meters: f64,
        duration_sec: u64,
        avg_speed_mps: f64,
        mode: TransportMode,
        kg_co2: f64,
        cost: f64,
        samples: Vec<LocationSample>,
        started_at_ms: Option<i64>,
        stopped_at_ms: Option<i64>,
    ) -> Self {
        Self {
            distance_meters,
            duration_sec,
            avg_speed_mps,
            mode,
            kg_co2: round_to(kg_co2, 4),
            cost: round_to(cost, 2),
            samples,
            started_at_ms,
            stopped_at_ms,
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.
    }

    pub fn get_samples_blob(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.samples)
    }

    pub fn samples_from_blob(blob: &[u8]) -> Result<Vec<LocationSample>, bincode::Error> {
        bincode::deserialize(blob)
    }
}
