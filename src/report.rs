use crate::core::climate::AnnualDegreeDays;
use crate::core::energy_supply::cost::{DayBudget, MonthBudget};
use crate::core::thermal_model::HourlyPerformance;
use crate::core::weather::{HourlySample, Provenance};
use crate::forecast::LookupSummary;
use crate::forecast_window::ForecastWindow;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;

/// This module defines the forecast report and the flattened summary sent to the thermostat
/// bridge.

const BRIDGE_MONEY_DP: u32 = 2;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DegreeDayKind {
    Heating,
    Cooling,
}

/// Something a reader of the forecast should know about the data behind it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DataQualityNote {
    /// A synthetic month could not reach its degree-day target inside its temperature bounds.
    CalibrationShortfall {
        year: i32,
        month: u32,
        degree_days: DegreeDayKind,
        target: f64,
        achieved: f64,
    },
    /// The month's cooling degree-days were dropped because no hour may exceed the cooling base.
    CoolingSuppressed { year: i32, month: u32, target: f64 },
    ProviderFailed { provider: String, reason: String },
    DefaultElectricityRate { rate: Decimal },
    DefaultClimate { heating: f64, cooling: f64 },
    TimestampCollisions { count: usize },
    /// Real samples outside the window, or on the wrong side of the current hour for their source
    SamplesDiscarded { count: usize },
    EstimatedHours { forecast: usize, synthetic: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ProvenanceCounts {
    pub actual: usize,
    pub forecast: usize,
    pub synthetic: usize,
}

impl ProvenanceCounts {
    pub fn total(&self) -> usize {
        self.actual + self.forecast + self.synthetic
    }
}

/// One row of the hourly output file.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HourlyRecord {
    pub time: NaiveDateTime,
    pub temperature_f: f64,
    pub relative_humidity_pct: f64,
    pub provenance: Provenance,
    pub heat_pump_kwh: f64,
    pub aux_kwh: f64,
    pub cooling_kwh: f64,
}

impl HourlyRecord {
    pub fn new(sample: &HourlySample, performance: &HourlyPerformance) -> Self {
        Self {
            time: sample.timestamp(),
            temperature_f: sample.outdoor_temp_f(),
            relative_humidity_pct: sample.relative_humidity_pct(),
            provenance: sample.provenance(),
            heat_pump_kwh: performance.heat_pump_kwh,
            aux_kwh: performance.aux_kwh,
            cooling_kwh: performance.cooling_kwh,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastReport {
    pub location: String,
    pub window: ForecastWindow,
    pub generated_at: NaiveDateTime,
    pub balance_point_f: Option<f64>,
    pub electricity_rate: Decimal,
    pub rate_source: LookupSummary,
    pub climate_source: LookupSummary,
    pub annual_degree_days: AnnualDegreeDays,
    /// Set when the rate or the climate fell back to built-in defaults
    pub low_confidence: bool,
    pub has_estimated_hours: bool,
    pub hours: ProvenanceCounts,
    /// Budget for the first month the window touches
    pub month: Option<MonthBudget>,
    pub months: Vec<MonthBudget>,
    pub days: Vec<DayBudget>,
    pub data_quality: Vec<DataQualityNote>,
    #[serde(skip)]
    pub hourly: Vec<HourlyRecord>,
}

impl ForecastReport {
    pub fn bridge_summary(&self) -> BridgeSummary {
        let sum = |kwh: fn(&DayBudget) -> f64| self.days.iter().map(kwh).sum::<f64>();
        let total_cost = self
            .months
            .iter()
            .map(|month| month.total_cost)
            .sum::<Decimal>();

        BridgeSummary {
            location: self.location.clone(),
            total_kwh: sum(|day| day.total_kwh),
            heating_kwh: sum(|day| day.heating_kwh),
            cooling_kwh: sum(|day| day.cooling_kwh),
            aux_kwh: sum(|day| day.aux_kwh),
            total_cost: total_cost.round_dp(BRIDGE_MONEY_DP),
            electricity_rate: self.electricity_rate,
            days_in_month: self.month.as_ref().map_or(0, |month| month.days_in_month),
            low_confidence: self.low_confidence,
            daily_summary: self.days.iter().map(DailySummary::from).collect(),
        }
    }
}

/// Flattened totals in the shape the thermostat bridge displays.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSummary {
    pub location: String,
    pub total_kwh: f64,
    pub heating_kwh: f64,
    pub cooling_kwh: f64,
    pub aux_kwh: f64,
    pub total_cost: Decimal,
    pub electricity_rate: Decimal,
    pub days_in_month: u32,
    pub low_confidence: bool,
    pub daily_summary: Vec<DailySummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    /// e.g. "Wed, 2/4"
    pub day: String,
    /// Cost without auxiliary heat
    pub cost: Decimal,
    pub cost_with_aux: Decimal,
    pub low_temp: f64,
    pub high_temp: f64,
    pub total_kwh: f64,
    pub aux_kwh: f64,
    pub estimated: bool,
}

impl From<&DayBudget> for DailySummary {
    fn from(day: &DayBudget) -> Self {
        Self {
            day: day.period_start.format("%a, %-m/%-d").to_string(),
            cost: (day.total_cost - day.aux_cost).round_dp(BRIDGE_MONEY_DP),
            cost_with_aux: day.total_cost.round_dp(BRIDGE_MONEY_DP),
            low_temp: day.low_temp_f.round(),
            high_temp: day.high_temp_f.round(),
            total_kwh: day.total_kwh,
            aux_kwh: day.aux_kwh,
            estimated: day.has_estimated_hours,
        }
    }
}
