use crate::core::solvers::root_in_bracket;
use crate::core::units::HOURS_PER_DAY;
use crate::core::weather::{HourlySample, Provenance};
use crate::errors::ConfigurationError;
use crate::forecast_window::{days_in_month, first_of_month};
use crate::statistics::{cooling_degree_days, heating_degree_days};
use chrono::{Duration, NaiveTime};
use rand::{Rng, SeedableRng};
use rand_pcg::Lcg64Xsh32;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// This module synthesises plausible hourly weather for hours with no measured or forecast
/// data, calibrated so the month's degree-day totals match climate statistics.

pub const DEFAULT_SEED: u64 = 37;
const PEAK_HOUR: f64 = 14.;
const BASE_HUMIDITY_PCT: f64 = 60.;
const HUMIDITY_SWING_PCT: f64 = 10.;
const MAX_BRACKET_DOUBLINGS: usize = 40;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GeneratorParams {
    /// Weight of the second harmonic in the diurnal curve
    pub harmonic_weight: f64,
    /// Fraction of the min-max range swept by the diurnal curve either side of the average
    pub diurnal_amplitude_factor: f64,
    /// Fraction of the min-max range swept by the slow drift across the month
    pub drift_fraction: f64,
    /// Standard deviation of hourly Gaussian noise, in °F; zero disables noise
    pub noise_std_dev_f: f64,
    pub seed: u64,
    /// Replaces the envelope minimum as the lower clamp
    pub floor_override_f: Option<f64>,
    /// Relative error at which a degree-day target counts as met
    pub calibration_tolerance: f64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            harmonic_weight: 0.3,
            diurnal_amplitude_factor: 0.4,
            drift_fraction: 0.1,
            noise_std_dev_f: 0.,
            seed: DEFAULT_SEED,
            floor_override_f: None,
            calibration_tolerance: 0.001,
        }
    }
}

/// Degree-day targets for one calendar month.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTarget {
    pub year: i32,
    pub month: u32,
    pub heating_degree_days: f64,
    pub cooling_degree_days: f64,
    pub heating_base_f: f64,
    pub cooling_base_f: f64,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureEnvelope {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// How well a generated month matches one degree-day target.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TargetFit {
    NoTarget,
    Met { target: f64, achieved: f64 },
    /// The target cannot be reached within the temperature bounds; the closest month is used.
    Shortfall { target: f64, achieved: f64 },
    /// Cooling was requested but no hour may exceed the cooling base, so it is forced to zero.
    Suppressed { target: f64 },
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationOutcome {
    pub heating: TargetFit,
    pub cooling: TargetFit,
}

#[derive(Clone, Debug)]
pub struct SyntheticMonth {
    pub samples: Vec<HourlySample>,
    pub calibration: CalibrationOutcome,
}

/// Normalised two-harmonic diurnal curve, one value per hour of the day, peaking at 2 PM.
/// Scaled by its own largest magnitude so it always spans at most [-1, 1] and touches 1.
pub fn diurnal_curve(harmonic_weight: f64) -> [f64; 24] {
    let raw: [f64; 24] = std::array::from_fn(|hour| {
        let theta = 2. * PI * (hour as f64 - PEAK_HOUR) / HOURS_PER_DAY as f64;
        theta.cos() + harmonic_weight * (2. * theta).cos()
    });
    let peak = raw.iter().fold(0f64, |acc, value| acc.max(value.abs()));
    if peak == 0. {
        return [0.; 24];
    }
    raw.map(|value| value / peak)
}

/// Standard normal draws by the Box-Muller transform over a seeded linear-congruential
/// generator.
struct BoxMuller {
    rng: Lcg64Xsh32,
    spare: Option<f64>,
}

impl BoxMuller {
    fn seeded(seed: u64) -> Self {
        Self {
            rng: Lcg64Xsh32::seed_from_u64(seed),
            spare: None,
        }
    }

    fn sample(&mut self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }
        let mut u1: f64 = self.rng.random();
        while u1 <= f64::EPSILON {
            u1 = self.rng.random();
        }
        let u2: f64 = self.rng.random();
        let radius = (-2. * u1.ln()).sqrt();
        let angle = 2. * PI * u2;
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }
}

#[derive(Clone, Copy)]
struct Bounds {
    lower: f64,
    upper: f64,
}

impl Bounds {
    fn clamp(&self, temp: f64) -> f64 {
        temp.max(self.lower).min(self.upper)
    }
}

#[derive(Clone, Copy, Debug)]
enum Side {
    Heating,
    Cooling,
}

impl Side {
    fn excess(self, temp: f64, base: f64) -> f64 {
        match self {
            Side::Heating => (base - temp).max(0.),
            Side::Cooling => (temp - base).max(0.),
        }
    }

    fn shifted(self, base: f64, excess: f64) -> f64 {
        match self {
            Side::Heating => base - excess,
            Side::Cooling => base + excess,
        }
    }

    fn degree_days(self, temps: &[f64], base: f64) -> f64 {
        match self {
            Side::Heating => heating_degree_days(temps.iter().copied(), base),
            Side::Cooling => cooling_degree_days(temps.iter().copied(), base),
        }
    }
}

/// Generate every hour of the target month, shaped by the envelope and calibrated to the
/// target degree-days.
pub fn generate_month(
    target: &MonthTarget,
    envelope: &TemperatureEnvelope,
    params: &GeneratorParams,
) -> Result<SyntheticMonth, ConfigurationError> {
    let month_start = first_of_month(target.year, target.month).ok_or_else(|| {
        ConfigurationError::new(
            "window",
            format!("{}-{} is not a calendar month", target.year, target.month),
        )
    })?;
    if target.heating_base_f > target.cooling_base_f {
        return Err(ConfigurationError::new(
            "heatingBaseF",
            format!(
                "heating base {} must not exceed cooling base {}",
                target.heating_base_f, target.cooling_base_f
            ),
        ));
    }
    let days = days_in_month(target.year, target.month);
    let curve = diurnal_curve(params.harmonic_weight);
    let range = (envelope.max - envelope.min).max(0.);
    let upper = envelope.max.max(envelope.min);
    let bounds = Bounds {
        lower: params.floor_override_f.unwrap_or(envelope.min).min(upper),
        upper,
    };
    let mut noise = (params.noise_std_dev_f > 0.).then(|| BoxMuller::seeded(params.seed));

    let hours = (days * HOURS_PER_DAY) as usize;
    let mut temps = Vec::with_capacity(hours);
    let mut humidity = Vec::with_capacity(hours);
    for day in 0..days {
        let drift = (2. * PI * day as f64 / days as f64).sin() * params.drift_fraction * range;
        for shape in curve {
            let mut temp = envelope.avg + shape * range * params.diurnal_amplitude_factor + drift;
            if let Some(noise) = noise.as_mut() {
                temp += noise.sample() * params.noise_std_dev_f;
            }
            temps.push(bounds.clamp(temp));
            humidity.push(BASE_HUMIDITY_PCT - shape * HUMIDITY_SWING_PCT);
        }
    }

    let heating = calibrate(
        &mut temps,
        Side::Heating,
        target.heating_degree_days,
        target.heating_base_f,
        bounds,
        params.calibration_tolerance,
    );
    let cooling = if target.cooling_degree_days > 0. && bounds.upper <= target.cooling_base_f {
        warn!(
            year = target.year,
            month = target.month,
            target = target.cooling_degree_days,
            "no synthetic hour may exceed the cooling base; cooling degree-days forced to zero"
        );
        TargetFit::Suppressed {
            target: target.cooling_degree_days,
        }
    } else {
        calibrate(
            &mut temps,
            Side::Cooling,
            target.cooling_degree_days,
            target.cooling_base_f,
            bounds,
            params.calibration_tolerance,
        )
    };

    let start = month_start.and_time(NaiveTime::MIN);
    let samples = temps
        .into_iter()
        .zip(humidity)
        .enumerate()
        .map(|(i, (temp, rh))| {
            HourlySample::new(
                start + Duration::hours(i as i64),
                temp,
                rh,
                Provenance::Synthetic,
            )
        })
        .collect();

    Ok(SyntheticMonth {
        samples,
        calibration: CalibrationOutcome { heating, cooling },
    })
}

/// Rescale each hour's deficit (or surplus) relative to `base` so the degree-day total
/// hits `target`. The first pass uses `target / actual`. If clamping to the bounds leaves the
/// total outside tolerance, the factor is re-solved against the clamped total.
fn calibrate(
    temps: &mut [f64],
    side: Side,
    target: f64,
    base: f64,
    bounds: Bounds,
    tolerance: f64,
) -> TargetFit {
    if target <= 0. {
        return TargetFit::NoTarget;
    }
    let actual = side.degree_days(temps, base);
    if actual <= 0. {
        warn!(?side, target, "no generated hour is past the base; cannot calibrate");
        return TargetFit::Shortfall {
            target,
            achieved: 0.,
        };
    }

    let original = temps.to_vec();
    let excess = original
        .iter()
        .map(|&temp| side.excess(temp, base))
        .collect::<Vec<_>>();
    let scaled = |k: f64| -> Vec<f64> {
        original
            .iter()
            .zip(&excess)
            .map(|(&temp, &excess)| {
                if excess > 0. {
                    bounds.clamp(side.shifted(base, excess * k))
                } else {
                    temp
                }
            })
            .collect()
    };
    let achieved_for = |k: f64| side.degree_days(&scaled(k), base);
    let relative_error = |achieved: f64| (achieved - target).abs() / target;

    let mut factor = target / actual;
    let mut achieved = achieved_for(factor);
    if relative_error(achieved) > tolerance {
        debug!(?side, target, achieved, "clamping biased calibration; re-solving factor");
        factor = resolve_factor(&achieved_for, target, factor);
        achieved = achieved_for(factor);
    }
    temps.copy_from_slice(&scaled(factor));

    if relative_error(achieved) <= tolerance {
        TargetFit::Met { target, achieved }
    } else {
        warn!(?side, target, achieved, "degree-day target unreachable within bounds");
        TargetFit::Shortfall { target, achieved }
    }
}

fn resolve_factor(achieved_for: &impl Fn(f64) -> f64, target: f64, initial: f64) -> f64 {
    let residual = |k: f64| achieved_for(k) - target;
    if residual(0.) >= 0. {
        return 0.;
    }
    let mut upper = initial.max(1.);
    let mut doublings = 0;
    while residual(upper) < 0. {
        if doublings == MAX_BRACKET_DOUBLINGS {
            return upper;
        }
        upper *= 2.;
        doublings += 1;
    }
    root_in_bracket(residual, 0., upper, Some(1e-9)).unwrap_or(upper)
}
