use crate::core::climate::AnnualDegreeDays;
use crate::core::units::to_decimal;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{BufReader, Cursor, Read};

/// This module contains state-average residential electricity rates and annual degree-days
/// for the US, used when no live data is available for a location.

lazy_static! {
    static ref EMBEDDED_STATE_AVERAGES: Result<StateAverages, String> = StateAverages::new(
        BufReader::new(Cursor::new(include_str!("./state_averages.csv")))
    )
    .map_err(|e| e.to_string());
}

#[derive(Clone, Debug, Deserialize)]
struct StateRow {
    state: String,
    name: String,
    rate_usd_per_kwh: f64,
    annual_hdd: f64,
    annual_cdd: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateAverage {
    pub code: String,
    pub name: String,
    pub electricity_rate: Decimal,
    pub degree_days: AnnualDegreeDays,
}

#[derive(Clone, Debug)]
pub struct StateAverages {
    by_code: IndexMap<String, StateAverage>,
}

impl StateAverages {
    pub fn new(csv: impl Read) -> anyhow::Result<Self> {
        let mut by_code = IndexMap::new();
        for row in csv::Reader::from_reader(csv).deserialize::<StateRow>() {
            let row = row?;
            let code = row.state.trim().to_ascii_uppercase();
            by_code.insert(
                code.clone(),
                StateAverage {
                    code,
                    name: row.name,
                    electricity_rate: to_decimal(row.rate_usd_per_kwh),
                    degree_days: AnnualDegreeDays {
                        heating: row.annual_hdd,
                        cooling: row.annual_cdd,
                    },
                },
            );
        }

        Ok(Self { by_code })
    }

    /// The table compiled into the crate.
    pub fn embedded() -> anyhow::Result<&'static Self> {
        EMBEDDED_STATE_AVERAGES
            .as_ref()
            .map_err(|e| anyhow::anyhow!("Embedded state averages could not be read: {e}"))
    }

    /// Look up a state by its two-letter code or full name, ignoring case.
    pub fn get(&self, state: &str) -> Option<&StateAverage> {
        let state = state.trim();
        self.by_code.get(&state.to_ascii_uppercase()).or_else(|| {
            self.by_code
                .values()
                .find(|average| average.name.eq_ignore_ascii_case(state))
        })
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
