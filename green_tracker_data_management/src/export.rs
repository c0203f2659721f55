use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use green_tracker_lib::history::HistoryRecord;

use crate::DataManagerError;

const INPUT_COLUMNS: [&str; 8] = [
    "transportKm",
    "transportMode",
    "meatMealsPerWeek",
    "singleUsePlasticsPerWeek",
    "electricityKwhPerMonth",
    "reusableBottle",
    "reusableBag",
    "solarAtHome",
];

pub fn csv_header() -> String {
    let mut columns = vec!["date"];
    columns.extend(INPUT_COLUMNS);
    columns.extend(["totalKgCO2", "totalCost", "weeklyElectricityKwh", "liveDistanceMeters", "liveMode", "reportJSON"]);
    columns.join(",")
}

/// `green-tracker-history-YYYY-MM-DD.csv`
pub fn export_file_name(date: DateTime<Utc>) -> String {
    format!("green-tracker-history-{}.csv", date.format("%Y-%m-%d"))
}

/// Renders the history as CSV, one row per record in the order given.
pub fn history_to_csv(records: &[HistoryRecord]) -> Result<String, DataManagerError> {
    let mut out = csv_header();
    out.push('\n');

    for record in records {
        let mut row = vec![record.date.to_rfc3339_opts(SecondsFormat::Millis, true)];

        for column in INPUT_COLUMNS {
            row.push(match record.inputs.get(column) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(value) => value.to_string(),
            });
        }

        row.push(record.report.total_kg_co2.to_string());
        row.push(record.report.total_cost.to_string());
        row.push(record.report.weekly_electricity_kwh.map(|kwh| kwh.to_string()).unwrap_or_default());
        row.push(record.live.as_ref().map(|live| live.distance_meters.to_string()).unwrap_or_default());
        row.push(record.live.as_ref().map(|live| live.mode.to_string()).unwrap_or_default());
        row.push(serde_json::to_string(&record.report)
            .map_err(|e| DataManagerError::Export(format!("Failed to serialize report: {e}")))?);

        let escaped: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }

    Ok(out)
}

/// Writes the CSV into `dir` under the dated file name and returns its path.
pub async fn write_export(records: &[HistoryRecord], dir: impl AsRef<Path>, date: DateTime<Utc>) -> Result<PathBuf, DataManagerError> {
    let csv = history_to_csv(records)?;
    let path = dir.as_ref().join(export_file_name(date));

    tokio::fs::write(&path, csv).await
        .map_err(|e| DataManagerError::Export(format!("Failed to write {:?}: {e}", path)))?;

    Ok(path)
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
