//! Weekly footprint estimate from self-reported habits. Transport uses the same
//! coefficient table as live tracking; the remaining factors are replaceable.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{emissions::EmissionCoefficientTable, round_to, snapshot::Snapshot, transport_mode::TransportMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklyInputs {
    /// Per day.
    pub transport_km: f64,
    pub transport_mode: TransportMode,
    pub meat_meals_per_week: u32,
    pub single_use_plastics_per_week: u32,
    pub electricity_kwh_per_month: f64,
    pub reusable_bottle: bool,
    pub reusable_bag: bool,
    pub solar_at_home: bool,
}

impl Default for WeeklyInputs {
    fn default() -> Self {
        Self {
            transport_km: 12.,
            transport_mode: TransportMode::Car,
            meat_meals_per_week: 3,
            single_use_plastics_per_week: 4,
            electricity_kwh_per_month: 200.,
            reusable_bottle: false,
            reusable_bag: false,
            solar_at_home: false,
        }
    }
}

impl WeeklyInputs {
    /// Folds a tracked trip into the habits: the daily distance never shrinks,
    /// and the trip's mode becomes the habitual mode.
    pub fn absorb_live(&mut self, snapshot: &Snapshot) {
        self.transport_km = self.transport_km.max(snapshot.distance_km().round());
        self.transport_mode = snapshot.mode;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorFactors {
    pub meat_meal_kg_co2: f64,
    pub single_use_plastic_kg_co2: f64,
    pub single_use_plastic_cost: f64,
    pub electricity_kg_co2_per_kwh: f64,
    pub electricity_cost_per_kwh: f64,
    pub veg_swap_saving_per_meal: f64,
    pub reusable_bottle_saving: f64,
    pub reusable_bag_saving: f64,
    pub solar_offset: f64,
    pub kg_co2_per_tree: f64,
}

impl Default for EstimatorFactors {
    fn default() -> Self {
        Self {
            meat_meal_kg_co2: 2.5,
            single_use_plastic_kg_co2: 0.1,
            single_use_plastic_cost: 20.,
            electricity_kg_co2_per_kwh: 0.82,
            electricity_cost_per_kwh: 8.,
            veg_swap_saving_per_meal: 40.,
            reusable_bottle_saving: 30.,
            reusable_bag_saving: 10.,
            solar_offset: 0.6,
            kg_co2_per_tree: 21.,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    #[serde(rename = "transportKgCO2")]
    pub transport_kg_co2: f64,
    pub transport_cost: f64,
    #[serde(rename = "foodKgCO2")]
    pub food_kg_co2: f64,
    pub food_cost_savings_if_veg_swap: f64,
    #[serde(rename = "plasticsKgCO2")]
    pub plastics_kg_co2: f64,
    pub plastics_cost: f64,
    #[serde(rename = "electricityKgCO2")]
    pub electricity_kg_co2: f64,
    pub electricity_cost: f64,
    #[serde(rename = "totalKgCO2")]
    pub total_kg_co2: f64,
    pub total_cost: f64,
    pub trees_saved: f64,
    pub weekly_electricity_kwh: f64,
}

pub fn calculate_weekly(inputs: &WeeklyInputs, table: &EmissionCoefficientTable, factors: &EstimatorFactors) -> WeeklyReport {
    let weekly_km = inputs.transport_km.max(0.) * 7.;
    let transport = table.project(weekly_km * 1000., inputs.transport_mode);

    let meat_meals = inputs.meat_meals_per_week as f64;
    let food_kg_co2 = meat_meals * factors.meat_meal_kg_co2;
    let food_savings = meat_meals * factors.veg_swap_saving_per_meal;

    let plastics = inputs.single_use_plastics_per_week as f64;
    let plastics_kg_co2 = plastics * factors.single_use_plastic_kg_co2;
    let plastics_cost = plastics * factors.single_use_plastic_cost;

    let weekly_kwh = inputs.electricity_kwh_per_month.max(0.) * 12. / 52.;
    let electricity_kg_co2 = weekly_kwh * factors.electricity_kg_co2_per_kwh;
    let electricity_cost = weekly_kwh * factors.electricity_cost_per_kwh;

    let reusable_savings = if inputs.reusable_bottle { factors.reusable_bottle_saving } else { 0. }
        + if inputs.reusable_bag { factors.reusable_bag_saving } else { 0. };
    let solar_savings = if inputs.solar_at_home { electricity_cost * factors.solar_offset } else { 0. };

    let total_kg_co2 = transport.kg_co2 + food_kg_co2 + plastics_kg_co2 + electricity_kg_co2;
    let total_cost = transport.cost + plastics_cost + electricity_cost - reusable_savings - solar_savings - food_savings;

    WeeklyReport {
        transport_kg_co2: round_to(transport.kg_co2, 2),
        transport_cost: round_to(transport.cost, 2),
        food_kg_co2: round_to(food_kg_co2, 2),
        food_cost_savings_if_veg_swap: round_to(food_savings, 2),
        plastics_kg_co2: round_to(plastics_kg_co2, 2),
        plastics_cost: round_to(plastics_cost, 2),
        electricity_kg_co2: round_to(electricity_kg_co2, 2),
        electricity_cost: round_to(electricity_cost, 2),
        total_kg_co2: round_to(total_kg_co2, 2),
        total_cost: round_to(total_cost, 2),
        trees_saved: round_to(total_kg_co2 / factors.kg_co2_per_tree, 2),
        weekly_electricity_kwh: round_to(weekly_kwh, 2),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionId {
    SwitchPublic,
    Carpool,
    BikeShort,
    Bottle,
    VegSwap,
    Solar,
}

impl SuggestionId {
    pub const ALL: [SuggestionId; 6] = [
        SuggestionId::SwitchPublic,
        SuggestionId::Carpool,
        SuggestionId::BikeShort,
        SuggestionId::Bottle,
        SuggestionId::VegSwap,
        SuggestionId::Solar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionId::SwitchPublic => "switch_public",
            SuggestionId::Carpool => "carpool",
            SuggestionId::BikeShort => "bike_short",
            SuggestionId::Bottle => "bottle",
            SuggestionId::VegSwap => "veg_swap",
            SuggestionId::Solar => "solar",
        }
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SuggestionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        SuggestionId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("Unknown suggestion '{trimmed}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(rename = "kgCO2")]
    pub kg_co2: f64,
    pub money: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub title: String,
    pub impact: Impact,
}

impl Suggestion {
    fn new(id: SuggestionId, title: &str, kg_co2: f64, money: f64) -> Self {
        Self { id, title: title.to_string(), impact: Impact { kg_co2: round_to(kg_co2, 2), money } }
    }
}

pub fn generate_suggestions(report: &WeeklyReport, inputs: &WeeklyInputs, factors: &EstimatorFactors) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    match inputs.transport_mode {
        TransportMode::Car => {
            suggestions.push(Suggestion::new(SuggestionId::SwitchPublic, "Try public transport 2 days/week", report.transport_kg_co2 * 0.3, 200.));
            suggestions.push(Suggestion::new(SuggestionId::Carpool, "Carpool once a week", report.transport_kg_co2 * 0.15, 100.));
        }
        TransportMode::Public => {
            suggestions.push(Suggestion::new(SuggestionId::BikeShort, "Cycle for short trips", report.transport_kg_co2 * 0.2, 0.));
        }
        _ => {}
    }

    if !inputs.reusable_bottle && inputs.single_use_plastics_per_week > 0 {
        suggestions.push(Suggestion::new(
            SuggestionId::Bottle,
            "Use a reusable bottle",
            inputs.single_use_plastics_per_week as f64 * 0.1,
            150.,
        ));
    }

    if inputs.meat_meals_per_week > 0 {
        suggestions.push(Suggestion::new(SuggestionId::VegSwap, "Replace 1 meat meal with veg each week", factors.meat_meal_kg_co2, 40.));
    }

    if !inputs.solar_at_home && inputs.electricity_kwh_per_month > 100. {
        suggestions.push(Suggestion::new(SuggestionId::Solar, "Consider home solar (long-term)", report.electricity_kg_co2 * 0.6, 500.));
    }

    suggestions
}

/// Changes the habits the way the suggestion proposes.
pub fn apply_suggestion(inputs: &mut WeeklyInputs, suggestion: SuggestionId) {
    match suggestion {
        SuggestionId::SwitchPublic => inputs.transport_mode = TransportMode::Public,
        SuggestionId::Carpool => inputs.transport_km = (inputs.transport_km - 5.).max(0.),
        SuggestionId::BikeShort => inputs.transport_mode = TransportMode::Bike,
        SuggestionId::Bottle => {
            inputs.reusable_bottle = true;
            inputs.single_use_plastics_per_week = inputs.single_use_plastics_per_week.saturating_sub(3);
        }
        SuggestionId::VegSwap => inputs.meat_meals_per_week = inputs.meat_meals_per_week.saturating_sub(1),
        SuggestionId::Solar => inputs.solar_at_home = true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    LowEmitter,
    Bottle,
    Solar,
    Thrifty,
}

impl Badge {
    pub fn label(&self) -> &'static str {
        match self {
            Badge::LowEmitter => "Low Emission",
            Badge::Bottle => "Reusable Hero",
            Badge::Solar => "Solar Friend",
            Badge::Thrifty => "Thrifty Saver",
        }
    }
}

pub fn compute_badges(report: &WeeklyReport, inputs: &WeeklyInputs) -> Vec<Badge> {
    let mut badges = Vec::new();
    if report.total_kg_co2 < 10. {
        badges.push(Badge::LowEmitter);
    }
    if inputs.reusable_bottle {
        badges.push(Badge::Bottle);
    }
    if inputs.solar_at_home {
        badges.push(Badge::Solar);
    }
    if report.total_cost < 500. {
        badges.push(Badge::Thrifty);
    }
    badges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_for(inputs: &WeeklyInputs) -> WeeklyReport {
        calculate_weekly(inputs, &EmissionCoefficientTable::default(), &EstimatorFactors::default())
    }

    #[test]
    fn default_household() {
        let report = report_for(&WeeklyInputs::default());

        // 84 km by car
        assert_eq!(report.transport_kg_co2, 17.64);
        assert_eq!(report.transport_cost, 126.);
        assert_eq!(report.food_kg_co2, 7.5);
        assert_eq!(report.plastics_kg_co2, 0.4);
        assert_eq!(report.plastics_cost, 80.);
        assert_eq!(report.weekly_electricity_kwh, 46.15);
        assert_eq!(report.electricity_kg_co2, 37.85);
        assert_eq!(report.electricity_cost, 369.23);
        assert_eq!(report.total_kg_co2, 63.39);
        // 126 + 80 + 369.23 - 120 veg swap savings
        assert_eq!(report.total_cost, 455.23);
        assert_eq!(report.trees_saved, 3.02);
    }

    #[test]
    fn solar_and_reusables_reduce_cost() {
        let base = report_for(&WeeklyInputs::default());
        let green = report_for(&WeeklyInputs { solar_at_home: true, reusable_bottle: true, reusable_bag: true, ..Default::default() });
        let expected = base.total_cost - 40. - 369.2307692 * 0.6;
        assert!((green.total_cost - expected).abs() < 0.02, "{} vs {}", green.total_cost, expected);
        assert_eq!(green.total_kg_co2, base.total_kg_co2);
    }

    #[test]
    fn car_household_gets_transport_suggestions() {
        let inputs = WeeklyInputs::default();
        let report = report_for(&inputs);
        let ids: Vec<_> = generate_suggestions(&report, &inputs, &EstimatorFactors::default()).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SuggestionId::SwitchPublic, SuggestionId::Carpool, SuggestionId::Bottle, SuggestionId::VegSwap, SuggestionId::Solar]);
    }

    #[test]
    fn walking_vegan_with_solar_gets_nothing() {
        let inputs = WeeklyInputs {
            transport_mode: TransportMode::Walk,
            meat_meals_per_week: 0,
            single_use_plastics_per_week: 0,
            solar_at_home: true,
            ..Default::default()
        };
        assert!(generate_suggestions(&report_for(&inputs), &inputs, &EstimatorFactors::default()).is_empty());
    }

    #[test]
    fn suggestion_ids_parse_by_wire_name() {
        for id in SuggestionId::ALL {
            assert_eq!(serde_json::to_value(id).unwrap(), id.as_str());
            assert_eq!(id.as_str().parse::<SuggestionId>(), Ok(id));
        }
        assert!("teleport".parse::<SuggestionId>().is_err());
    }

    #[test]
    fn applying_suggestions() {
        let mut inputs = WeeklyInputs::default();
        apply_suggestion(&mut inputs, SuggestionId::Carpool);
        apply_suggestion(&mut inputs, SuggestionId::Bottle);
        apply_suggestion(&mut inputs, SuggestionId::VegSwap);
        apply_suggestion(&mut inputs, SuggestionId::SwitchPublic);

        assert_eq!(inputs.transport_km, 7.);
        assert!(inputs.reusable_bottle);
        assert_eq!(inputs.single_use_plastics_per_week, 1);
        assert_eq!(inputs.meat_meals_per_week, 2);
        assert_eq!(inputs.transport_mode, TransportMode::Public);

        apply_suggestion(&mut inputs, SuggestionId::Bottle);
        assert_eq!(inputs.single_use_plastics_per_week, 0);
    }

    #[test]
    fn badges() {
        let inputs = WeeklyInputs::default();
        assert_eq!(compute_badges(&report_for(&inputs), &inputs), vec![Badge::Thrifty]);

        let frugal = WeeklyInputs {
            transport_mode: TransportMode::Bike,
            meat_meals_per_week: 0,
            electricity_kwh_per_month: 0.,
            reusable_bottle: true,
            ..Default::default()
        };
        assert_eq!(compute_badges(&report_for(&frugal), &frugal), vec![Badge::LowEmitter, Badge::Bottle, Badge::Thrifty]);
    }

    #[test]
    fn absorbing_a_trip() {
        let mut inputs = WeeklyInputs::default();
        let trip = Snapshot::new(25_400., 1800, 14.1, TransportMode::Public, 1.27, 12.7, Vec::new(), Some(0), Some(1_800_000));
        inputs.absorb_live(&trip);
        assert_eq!(inputs.transport_km, 25.);
        assert_eq!(inputs.transport_mode, TransportMode::Public);

        let short = Snapshot::new(900., 600, 1.5, TransportMode::Walk, 0., 0., Vec::new(), Some(0), Some(600_000));
        inputs.absorb_live(&short);
        assert_eq!(inputs.transport_km, 25.);
        assert_eq!(inputs.transport_mode, TransportMode::Walk);
    }
}
