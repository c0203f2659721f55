use std::{collections::HashMap, fmt, path::Path, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::transport_mode::TransportMode;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coefficients {
    #[serde(rename = "kgCO2PerKm")]
    pub kg_co2_per_km: f64,
    pub cost_per_km: f64,
}

impl Coefficients {
    pub const fn new(kg_co2_per_km: f64, cost_per_km: f64) -> Self {
        Self { kg_co2_per_km, cost_per_km }
    }
}

/// Distance converted to km, with emission and cost. Never rounded here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Projection {
    pub km: f64,
    pub kg_co2: f64,
    pub cost: f64,
}

#[derive(Debug)]
pub enum TableError {
    MissingCar,
    Io(String),
    Parse(String),
    AlreadyInstalled,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::MissingCar => write!(f, "Coefficient table must contain a 'car' entry"),
            TableError::Io(msg) => write!(f, "Failed to read coefficient table: {msg}"),
            TableError::Parse(msg) => write!(f, "Failed to parse coefficient table: {msg}"),
            TableError::AlreadyInstalled => write!(f, "A coefficient table is already installed"),
        }
    }
}

impl std::error::Error for TableError {}

/// Per-mode emission and cost rates. Shared by the live projector and the weekly estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionCoefficientTable {
    entries: HashMap<TransportMode, Coefficients>,
}

static GLOBAL_TABLE: OnceLock<EmissionCoefficientTable> = OnceLock::new();

impl Default for EmissionCoefficientTable {
    fn default() -> Self {
        let entries = HashMap::from([
            (TransportMode::Car, Coefficients::new(0.21, 1.5)),
            (TransportMode::Motorcycle, Coefficients::new(0.11, 0.6)),
            (TransportMode::Public, Coefficients::new(0.05, 0.5)),
            (TransportMode::Bike, Coefficients::new(0.0, 0.0)),
            (TransportMode::Walk, Coefficients::new(0.0, 0.0)),
        ]);
        Self { entries }
    }
}

impl EmissionCoefficientTable {
    pub fn new(entries: HashMap<TransportMode, Coefficients>) -> Result<Self, TableError> {
        if !entries.contains_key(&TransportMode::Car) {
            return Err(TableError::MissingCar);
        }
        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let entries: HashMap<TransportMode, Coefficients> =
            serde_json::from_str(json).map_err(|e| TableError::Parse(e.to_string()))?;
        Self::new(entries)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TableError::Io(format!("{path:?}: {e}")))?;
        Self::from_json(&json)
    }

    /// Installs the process-wide table. Only the first install wins.
    pub fn install(table: EmissionCoefficientTable) -> Result<(), TableError> {
        GLOBAL_TABLE.set(table).map_err(|_| TableError::AlreadyInstalled)
    }

    /// The installed table, or the built-in defaults if none was installed.
    pub fn global() -> &'static EmissionCoefficientTable {
        GLOBAL_TABLE.get_or_init(EmissionCoefficientTable::default)
    }

    /// Missing modes fall back to the `car` entry.
    pub fn coefficients(&self, mode: TransportMode) -> Coefficients {
        self.entries
            .get(&mode)
            .or_else(|| self.entries.get(&TransportMode::Car))
            .copied()
            .unwrap_or(Coefficients::new(0.21, 1.5))
    }

    pub fn project(&self, distance_meters: f64, mode: TransportMode) -> Projection {
        let km = distance_meters / 1000.;
        let coefficients = self.coefficients(mode);
        Projection {
            km,
            kg_co2: km * coefficients.kg_co2_per_km,
            cost: km * coefficients.cost_per_km,
        }
    }

    pub fn project_named(&self, distance_meters: f64, mode: &str) -> Projection {
        self.project(distance_meters, TransportMode::parse_lenient(mode))
    }
}

/// Speed based guess of the transport mode. Only a hint, never applied to a session.
pub fn detect_mode_from_speed(meters_per_second: f64) -> TransportMode {
    let kmh = meters_per_second * 3.6;
    if kmh < 8. {
        TransportMode::Walk
    } else if kmh < 20. {
        TransportMode::Bike
    } else if kmh < 50. {
        TransportMode::Public
    } else {
        TransportMode::Car
    }
}
