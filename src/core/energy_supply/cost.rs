use crate::core::thermal_model::HourlyPerformance;
use crate::core::units::{to_decimal, HOURS_PER_DAY, MONEY_SCALE};
use crate::core::weather::HourlySample;
use crate::forecast_window::days_in_month;
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use rayon::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// This module turns hourly energy into money and rolls it up into day and month budgets.

/// What a household pays for electricity.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    /// Dollars per kWh.
    pub electricity_rate: Decimal,
    /// Dollars per calendar month, independent of use.
    pub monthly_fixed_charge: Decimal,
    /// Non-HVAC consumption added to every day, kWh/day.
    pub baseload_kwh_per_day: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBudget {
    pub period_start: NaiveDate,
    pub hours: usize,
    pub heat_pump_kwh: f64,
    pub aux_kwh: f64,
    pub heating_kwh: f64,
    pub cooling_kwh: f64,
    pub baseload_kwh: f64,
    pub total_kwh: f64,
    pub energy_cost: Decimal,
    pub aux_cost: Decimal,
    pub fixed_cost: Decimal,
    pub total_cost: Decimal,
    pub low_temp_f: f64,
    pub high_temp_f: f64,
    pub has_estimated_hours: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBudget {
    pub period_start: NaiveDate,
    pub days_in_period: usize,
    pub days_in_month: u32,
    pub heat_pump_kwh: f64,
    pub aux_kwh: f64,
    pub heating_kwh: f64,
    pub cooling_kwh: f64,
    pub baseload_kwh: f64,
    pub total_kwh: f64,
    pub energy_cost: Decimal,
    pub fixed_cost: Decimal,
    pub total_cost: Decimal,
    pub has_estimated_hours: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Budgets {
    pub days: Vec<DayBudget>,
    pub months: Vec<MonthBudget>,
}

/// One forecast hour with the energy it used.
pub type CostedHour = (HourlySample, HourlyPerformance);

#[derive(Clone, Copy, Debug)]
pub struct CostAggregator {
    tariff: Tariff,
}

impl CostAggregator {
    pub fn new(tariff: Tariff) -> Self {
        Self { tariff }
    }

    /// Share of the monthly fixed charge billed to `date`. Every day gets the charge divided
    /// by the month's length, truncated to the money scale; the month's last day takes the
    /// remainder so a whole month sums to exactly the monthly charge.
    pub fn daily_fixed_share(&self, date: NaiveDate) -> Decimal {
        let days = days_in_month(date.year(), date.month());
        if days == 0 {
            return Decimal::ZERO;
        }
        let charge = self.tariff.monthly_fixed_charge;
        let base = (charge / Decimal::from(days))
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero);

        if date.day() == days {
            charge - base * Decimal::from(days - 1)
        } else {
            base
        }
    }

    fn energy_cost(&self, kwh: f64) -> Decimal {
        (to_decimal(kwh) * self.tariff.electricity_rate).round_dp(MONEY_SCALE)
    }

    /// Fold hours, which must be in ascending time order, into calendar-ordered day and month
    /// budgets. Days are folded in parallel.
    pub fn aggregate(&self, hours: &[CostedHour]) -> Budgets {
        let day_slices = hours
            .chunk_by(|(a, _), (b, _)| a.timestamp().date() == b.timestamp().date())
            .collect::<Vec<_>>();
        let days = day_slices
            .par_iter()
            .map(|day| self.fold_day(day))
            .collect::<Vec<_>>();

        let months = days
            .iter()
            .chunk_by(|day| (day.period_start.year(), day.period_start.month()))
            .into_iter()
            .filter_map(|((year, month), days)| fold_month(year, month, days))
            .collect();

        Budgets { days, months }
    }

    fn fold_day(&self, hours: &[CostedHour]) -> DayBudget {
        let period_start = hours
            .first()
            .map(|(sample, _)| sample.timestamp().date())
            .unwrap_or_default();
        let (heat_pump_kwh, aux_kwh, cooling_kwh) = hours.iter().fold(
            (0., 0., 0.),
            |(heat_pump, aux, cooling), (_, performance)| {
                (
                    heat_pump + performance.heat_pump_kwh,
                    aux + performance.aux_kwh,
                    cooling + performance.cooling_kwh,
                )
            },
        );
        let (low_temp_f, high_temp_f) = hours
            .iter()
            .map(|(sample, _)| sample.outdoor_temp_f())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), temp| {
                (low.min(temp), high.max(temp))
            });
        let baseload_kwh =
            self.tariff.baseload_kwh_per_day * hours.len() as f64 / f64::from(HOURS_PER_DAY);
        let heating_kwh = heat_pump_kwh + aux_kwh;
        let total_kwh = heating_kwh + cooling_kwh + baseload_kwh;

        let energy_cost = self.energy_cost(total_kwh);
        let fixed_cost = self.daily_fixed_share(period_start);

        DayBudget {
            period_start,
            hours: hours.len(),
            heat_pump_kwh,
            aux_kwh,
            heating_kwh,
            cooling_kwh,
            baseload_kwh,
            total_kwh,
            energy_cost,
            aux_cost: self.energy_cost(aux_kwh),
            fixed_cost,
            total_cost: energy_cost + fixed_cost,
            low_temp_f,
            high_temp_f,
            has_estimated_hours: hours
                .iter()
                .any(|(sample, _)| sample.provenance().is_estimated()),
        }
    }
}

fn fold_month<'a>(
    year: i32,
    month: u32,
    days: impl Iterator<Item = &'a DayBudget>,
) -> Option<MonthBudget> {
    let period_start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let mut budget = MonthBudget {
        period_start,
        days_in_period: 0,
        days_in_month: days_in_month(year, month),
        heat_pump_kwh: 0.,
        aux_kwh: 0.,
        heating_kwh: 0.,
        cooling_kwh: 0.,
        baseload_kwh: 0.,
        total_kwh: 0.,
        energy_cost: Decimal::ZERO,
        fixed_cost: Decimal::ZERO,
        total_cost: Decimal::ZERO,
        has_estimated_hours: false,
    };
    for day in days {
        budget.days_in_period += 1;
        budget.heat_pump_kwh += day.heat_pump_kwh;
        budget.aux_kwh += day.aux_kwh;
        budget.heating_kwh += day.heating_kwh;
        budget.cooling_kwh += day.cooling_kwh;
        budget.baseload_kwh += day.baseload_kwh;
        budget.total_kwh += day.total_kwh;
        budget.energy_cost += day.energy_cost;
        budget.fixed_cost += day.fixed_cost;
        budget.total_cost += day.total_cost;
        budget.has_estimated_hours |= day.has_estimated_hours;
    }

    Some(budget)
}
