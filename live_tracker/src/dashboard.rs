use chrono::{DateTime, Utc};
use green_tracker_data_management::{history_store::HistoryStore, DataManagerError};
use green_tracker_lib::{
    emissions::EmissionCoefficientTable,
    estimator::{
        apply_suggestion, calculate_weekly, compute_badges, generate_suggestions, Badge, EstimatorFactors, Suggestion,
        SuggestionId, WeeklyInputs, WeeklyReport,
    },
    history::HistoryRecord,
    snapshot::Snapshot,
};

/// The weekly view a live trip is applied to.
pub struct Dashboard {
    inputs: WeeklyInputs,
    factors: EstimatorFactors,
    table: &'static EmissionCoefficientTable,
    history: HistoryStore,
}

impl Dashboard {
    /// Starts from the habits of the most recent history entry that has them.
    pub async fn load(history: HistoryStore, table: &'static EmissionCoefficientTable) -> Self {
        let inputs = history.records().await
            .iter()
            .find_map(HistoryRecord::weekly_inputs)
            .unwrap_or_default();

        Self {
            inputs,
            factors: EstimatorFactors::default(),
            table,
            history,
        }
    }

    pub fn inputs(&self) -> &WeeklyInputs {
        &self.inputs
    }

    pub fn report(&self) -> WeeklyReport {
        calculate_weekly(&self.inputs, self.table, &self.factors)
    }

    pub fn suggestions(&self) -> Vec<Suggestion> {
        generate_suggestions(&self.report(), &self.inputs, &self.factors)
    }

    pub fn badges(&self) -> Vec<Badge> {
        compute_badges(&self.report(), &self.inputs)
    }

    /// Folds the trip into the habits and records the result.
    pub async fn apply_live(&mut self, snapshot: &Snapshot, date: DateTime<Utc>) -> Result<WeeklyReport, DataManagerError> {
        self.inputs.absorb_live(snapshot);
        self.history.append(HistoryRecord::from_applied_live(&self.inputs, snapshot.clone(), date)).await?;
        Ok(self.report())
    }

    /// Adopts a suggestion and records the new week. Only suggestions currently on offer count.
    pub async fn accept_suggestion(&mut self, id: SuggestionId, date: DateTime<Utc>) -> Result<Option<WeeklyReport>, DataManagerError> {
        if !self.suggestions().iter().any(|suggestion| suggestion.id == id) {
            return Ok(None);
        }

        apply_suggestion(&mut self.inputs, id);
        let report = self.report();
        self.history.append(HistoryRecord::from_weekly(&self.inputs, &report, date)).await?;
        Ok(Some(report))
    }
}
