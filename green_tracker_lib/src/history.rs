use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    estimator::{WeeklyInputs, WeeklyReport},
    snapshot::Snapshot,
};

pub const LIVE_SNAPSHOT_NOTE: &str = "live snapshot";
pub const APPLIED_LIVE_NOTE: &str = "applied from live snapshot";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    #[serde(rename = "totalKgCO2")]
    pub total_kg_co2: f64,
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_electricity_kwh: Option<f64>,
    /// The full estimator report for saved weeks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklyReport>,
}

/// One entry of the local history, newest first on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: DateTime<Utc>,
    /// The habits at the time of the record. An empty object for bare live snapshots.
    #[serde(default)]
    pub inputs: serde_json::Value,
    pub report: HistoryReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<Snapshot>,
}

impl HistoryRecord {
    /// The record written for every completed trip, independent of the relay.
    pub fn from_live(snapshot: Snapshot, date: DateTime<Utc>) -> Self {
        Self {
            date,
            inputs: serde_json::Value::Object(serde_json::Map::new()),
            report: HistoryReport {
                total_kg_co2: snapshot.kg_co2,
                total_cost: snapshot.cost,
                note: Some(LIVE_SNAPSHOT_NOTE.to_string()),
                ..Default::default()
            },
            live: Some(snapshot),
        }
    }

    /// A trip merged into the dashboard's habits.
    pub fn from_applied_live(inputs: &WeeklyInputs, snapshot: Snapshot, date: DateTime<Utc>) -> Self {
        Self {
            date,
            inputs: inputs_value(inputs),
            report: HistoryReport {
                total_kg_co2: snapshot.kg_co2,
                total_cost: snapshot.cost,
                note: Some(APPLIED_LIVE_NOTE.to_string()),
                weekly_electricity_kwh: Some(inputs.electricity_kwh_per_month / 4.),
                weekly: None,
            },
            live: Some(snapshot),
        }
    }

    /// A saved week from the estimator.
    pub fn from_weekly(inputs: &WeeklyInputs, report: &WeeklyReport, date: DateTime<Utc>) -> Self {
        Self {
            date,
            inputs: inputs_value(inputs),
            report: HistoryReport {
                total_kg_co2: report.total_kg_co2,
                total_cost: report.total_cost,
                note: None,
                weekly_electricity_kwh: Some(report.weekly_electricity_kwh),
                weekly: Some(report.clone()),
            },
            live: None,
        }
    }

    pub fn weekly_inputs(&self) -> Option<WeeklyInputs> {
        match &self.inputs {
            serde_json::Value::Object(map) if !map.is_empty() => serde_json::from_value(self.inputs.clone()).ok(),
            _ => None,
        }
    }
}

fn inputs_value(inputs: &WeeklyInputs) -> serde_json::Value {
    serde_json::to_value(inputs).unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
}
