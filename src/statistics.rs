/// A simple statistics module: temperature envelopes and degree-day totals.
use statrs::statistics::{Data, Distribution, Max, Min};

/// Mean, minimum and maximum of a run of temperatures.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemperatureSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

pub fn summarise(temperatures: &[f64]) -> Option<TemperatureSummary> {
    if temperatures.is_empty() {
        return None;
    }
    let data = Data::new(temperatures.to_vec());

    Some(TemperatureSummary {
        mean: data.mean()?,
        min: data.min(),
        max: data.max(),
    })
}

/// Heating degree-days implied by a run of hourly temperatures: `Σ max(0, base − t) / 24`.
pub fn heating_degree_days(hourly_temps: impl IntoIterator<Item = f64>, base_f: f64) -> f64 {
    hourly_temps
        .into_iter()
        .map(|temp| (base_f - temp).max(0.))
        .sum::<f64>()
        / 24.
}

/// Cooling degree-days implied by a run of hourly temperatures: `Σ max(0, t − base) / 24`.
pub fn cooling_degree_days(hourly_temps: impl IntoIterator<Item = f64>, base_f: f64) -> f64 {
    hourly_temps
        .into_iter()
        .map(|temp| (temp - base_f).max(0.))
        .sum::<f64>()
        / 24.
}
