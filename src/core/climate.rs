use crate::core::weather::synthetic::{MonthTarget, TemperatureEnvelope};
use crate::forecast_window::days_in_month;
use serde::{Deserialize, Serialize};

/// This module splits annual degree-day climate statistics into monthly targets.

/// Annual heating and cooling degree-day totals for a location.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualDegreeDays {
    pub heating: f64,
    pub cooling: f64,
}

impl AnnualDegreeDays {
    pub const DEFAULT: Self = Self {
        heating: 5000.,
        cooling: 1000.,
    };
}

// Typical share of a year's heating/cooling degree-days falling in each month, Jan..Dec.
const MONTHLY_HDD_SHARE: [f64; 12] = [
    0.19, 0.16, 0.13, 0.08, 0.04, 0.01, 0.0, 0.0, 0.02, 0.06, 0.12, 0.19,
];
const MONTHLY_CDD_SHARE: [f64; 12] = [
    0.0, 0.0, 0.01, 0.03, 0.09, 0.18, 0.25, 0.23, 0.14, 0.05, 0.01, 0.01,
];

const DEFAULT_ENVELOPE_HALF_RANGE_F: f64 = 10.;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateNormals {
    pub annual: AnnualDegreeDays,
    pub heating_base_f: f64,
    pub cooling_base_f: f64,
}

impl ClimateNormals {
    pub fn new(annual: AnnualDegreeDays, heating_base_f: f64, cooling_base_f: f64) -> Self {
        Self {
            annual,
            heating_base_f,
            cooling_base_f,
        }
    }

    pub fn month_target(&self, year: i32, month: u32) -> MonthTarget {
        let idx = (month.clamp(1, 12) - 1) as usize;
        MonthTarget {
            year,
            month,
            heating_degree_days: self.annual.heating * MONTHLY_HDD_SHARE[idx],
            cooling_degree_days: self.annual.cooling * MONTHLY_CDD_SHARE[idx],
            heating_base_f: self.heating_base_f,
            cooling_base_f: self.cooling_base_f,
        }
    }

    /// Envelope used to shape a synthetic month when no real hours are available: centred so
    /// that a flat month would produce the target degree-days.
    pub fn default_envelope(target: &MonthTarget) -> TemperatureEnvelope {
        let days = days_in_month(target.year, target.month).max(1) as f64;
        let avg = target.heating_base_f - target.heating_degree_days / days
            + target.cooling_degree_days / days;
        TemperatureEnvelope {
            avg,
            min: avg - DEFAULT_ENVELOPE_HALF_RANGE_F,
            max: avg + DEFAULT_ENVELOPE_HALF_RANGE_F,
        }
    }
}
