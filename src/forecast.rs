use crate::core::climate::ClimateNormals;
use crate::core::energy_supply::cost::{CostAggregator, CostedHour, Tariff};
use crate::core::thermal_model::{ThermalPerformanceModel, ThermalProfile, ThermalSetpoints};
use crate::core::weather::synthetic::{GeneratorParams, TargetFit};
use crate::core::weather::timeline::{build_timeline, TimelineDiagnostics};
use crate::core::weather::HourlySample;
use crate::errors::ForecastError;
use crate::fetch::FetchedWeather;
use crate::forecast_window::ForecastWindow;
use crate::report::{
    DataQualityNote, DegreeDayKind, ForecastReport, HourlyRecord, ProvenanceCounts,
};
use crate::resolver::Resolved;
use crate::sources::{Location, ProviderFailure, ResolutionTier};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// This module runs the forecast pipeline: weather timeline, thermal performance, then cost.

const DEFAULT_MEMO_CAPACITY: usize = 32;

/// Where a looked-up value came from.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupSummary {
    pub tier: ResolutionTier,
    pub provider: String,
}

impl<T> From<&Resolved<T>> for LookupSummary {
    fn from(resolved: &Resolved<T>) -> Self {
        Self {
            tier: resolved.tier,
            provider: resolved.provider.clone(),
        }
    }
}

/// Everything one forecast run depends on apart from weather, fully resolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastConfig {
    pub location: Location,
    pub window: ForecastWindow,
    pub now: NaiveDateTime,
    pub profile: ThermalProfile,
    pub setpoints: ThermalSetpoints,
    pub tariff: Tariff,
    pub climate: ClimateNormals,
    pub generator: GeneratorParams,
    pub rate_lookup: LookupSummary,
    pub climate_lookup: LookupSummary,
    pub lookup_failures: Vec<ProviderFailure>,
}

/// Real weather available for a run. Either list may be empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherInputs {
    pub historical: Vec<HourlySample>,
    pub forecast: Vec<HourlySample>,
    pub fetch_failures: Vec<ProviderFailure>,
}

impl From<FetchedWeather> for WeatherInputs {
    fn from(fetched: FetchedWeather) -> Self {
        Self {
            historical: fetched.historical,
            forecast: fetched.forecast,
            fetch_failures: fetched.failures,
        }
    }
}

/// Compute the forecast for `config` from the real weather in `weather`. The same inputs
/// always give the same report.
pub fn forecast(
    config: &ForecastConfig,
    weather: &WeatherInputs,
) -> Result<ForecastReport, ForecastError> {
    let model = ThermalPerformanceModel::new(config.profile, config.setpoints)?;
    let timeline = build_timeline(
        &config.window,
        config.now,
        &weather.historical,
        &weather.forecast,
        &config.climate,
        &config.generator,
    )?;
    let (samples, diagnostics) = timeline.into_parts();

    let performance = model.timeline_performance(&samples);
    let hours: Vec<CostedHour> = samples.into_iter().zip(performance).collect();
    let budgets = CostAggregator::new(config.tariff).aggregate(&hours);

    let counts = ProvenanceCounts {
        actual: diagnostics.actual_hours,
        forecast: diagnostics.forecast_hours,
        synthetic: diagnostics.synthetic_hours,
    };
    let low_confidence = config.rate_lookup.tier == ResolutionTier::BuiltInDefault
        || config.climate_lookup.tier == ResolutionTier::BuiltInDefault;
    let data_quality = data_quality_notes(config, weather, &diagnostics);

    info!(
        hours = counts.total(),
        synthetic = counts.synthetic,
        balance_point_f = ?model.balance_point_f(),
        notes = data_quality.len(),
        "forecast complete"
    );

    Ok(ForecastReport {
        location: config.location.label(),
        window: config.window,
        generated_at: config.now,
        balance_point_f: model.balance_point_f(),
        electricity_rate: config.tariff.electricity_rate,
        rate_source: config.rate_lookup.clone(),
        climate_source: config.climate_lookup.clone(),
        annual_degree_days: config.climate.annual,
        low_confidence,
        has_estimated_hours: counts.forecast + counts.synthetic > 0,
        hours: counts,
        month: budgets.months.first().cloned(),
        months: budgets.months,
        days: budgets.days,
        data_quality,
        hourly: hours
            .iter()
            .map(|(sample, performance)| HourlyRecord::new(sample, performance))
            .collect(),
    })
}

fn data_quality_notes(
    config: &ForecastConfig,
    weather: &WeatherInputs,
    diagnostics: &TimelineDiagnostics,
) -> Vec<DataQualityNote> {
    let mut notes = vec![];

    if config.rate_lookup.tier == ResolutionTier::BuiltInDefault {
        notes.push(DataQualityNote::DefaultElectricityRate {
            rate: config.tariff.electricity_rate,
        });
    }
    if config.climate_lookup.tier == ResolutionTier::BuiltInDefault {
        notes.push(DataQualityNote::DefaultClimate {
            heating: config.climate.annual.heating,
            cooling: config.climate.annual.cooling,
        });
    }
    notes.extend(
        config
            .lookup_failures
            .iter()
            .chain(&weather.fetch_failures)
            .map(|failure| DataQualityNote::ProviderFailed {
                provider: failure.provider.clone(),
                reason: failure.reason.clone(),
            }),
    );

    for calibration in &diagnostics.calibrations {
        let (year, month) = (calibration.year, calibration.month);
        for (degree_days, fit) in [
            (DegreeDayKind::Heating, calibration.outcome.heating),
            (DegreeDayKind::Cooling, calibration.outcome.cooling),
        ] {
            match fit {
                TargetFit::Shortfall { target, achieved } => {
                    warn!(year, month, %degree_days, target, achieved, "calibration shortfall");
                    notes.push(DataQualityNote::CalibrationShortfall {
                        year,
                        month,
                        degree_days,
                        target,
                        achieved,
                    });
                }
                TargetFit::Suppressed { target } => {
                    notes.push(DataQualityNote::CoolingSuppressed {
                        year,
                        month,
                        target,
                    });
                }
                TargetFit::NoTarget | TargetFit::Met { .. } => {}
            }
        }
    }

    if diagnostics.collisions > 0 {
        notes.push(DataQualityNote::TimestampCollisions {
            count: diagnostics.collisions,
        });
    }
    if diagnostics.dropped > 0 {
        notes.push(DataQualityNote::SamplesDiscarded {
            count: diagnostics.dropped,
        });
    }
    if diagnostics.forecast_hours + diagnostics.synthetic_hours > 0 {
        notes.push(DataQualityNote::EstimatedHours {
            forecast: diagnostics.forecast_hours,
            synthetic: diagnostics.synthetic_hours,
        });
    }

    notes
}

/// Runs forecasts, remembering recent reports keyed by a hash of their serialized inputs.
#[derive(Debug)]
pub struct ForecastEngine {
    capacity: usize,
    reports: Mutex<IndexMap<u64, Arc<ForecastReport>>>,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_CAPACITY)
    }
}

impl ForecastEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            reports: Default::default(),
        }
    }

    pub fn forecast(
        &self,
        config: &ForecastConfig,
        weather: &WeatherInputs,
    ) -> Result<Arc<ForecastReport>, ForecastError> {
        let key = input_key(config, weather);
        if let Some(report) = key.and_then(|key| self.reports.lock().get(&key).cloned()) {
            debug!(key, "forecast memo hit");
            return Ok(report);
        }

        let report = Arc::new(forecast(config, weather)?);
        if let Some(key) = key {
            let mut reports = self.reports.lock();
            if reports.len() >= self.capacity {
                reports.shift_remove_index(0);
            }
            reports.insert(key, report.clone());
        }

        Ok(report)
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn input_key(config: &ForecastConfig, weather: &WeatherInputs) -> Option<u64> {
    let serialized = serde_json::to_vec(&(config, weather)).ok()?;
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    Some(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::climate::AnnualDegreeDays;
    use crate::core::heating_systems::heat_pump::HeatPumpEnergyMethod;
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;
    use rstest::*;
    use rust_decimal::Decimal;

    fn lookup(tier: ResolutionTier) -> LookupSummary {
        LookupSummary {
            tier,
            provider: "test".to_string(),
        }
    }

    #[fixture]
    fn config() -> ForecastConfig {
        ForecastConfig {
            location: Location::new(39.74, -104.99).with_state("CO"),
            window: ForecastWindow::month(2026, 11).unwrap(),
            now: NaiveDate::from_ymd_opt(2026, 11, 10)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            profile: ThermalProfile {
                heat_loss_factor_btu_per_hr_per_f: 314.,
                heat_gain_factor_btu_per_hr_per_f: 314.,
                rated_tons: 3.,
                hspf2: 9.,
                seer2: 15.,
                compressor_power_kw: 5.,
                cutoff_temp_f: -15.,
                use_electric_aux: true,
                solar_exposure_multiplier: 1.,
                heat_pump_energy_method: HeatPumpEnergyMethod::CompressorRuntime,
            },
            setpoints: ThermalSetpoints {
                indoor_heating_target_f: 68.,
                heating_base_f: 65.,
                cooling_base_f: 65.,
            },
            tariff: Tariff {
                electricity_rate: Decimal::new(15, 2),
                monthly_fixed_charge: Decimal::new(10, 0),
                baseload_kwh_per_day: 10.,
            },
            climate: ClimateNormals::new(AnnualDegreeDays::DEFAULT, 65., 65.),
            generator: GeneratorParams::default(),
            rate_lookup: lookup(ResolutionTier::UserSupplied),
            climate_lookup: lookup(ResolutionTier::StateAverage),
            lookup_failures: vec![],
        }
    }

    fn actual_hours(config: &ForecastConfig, count: i64) -> Vec<HourlySample> {
        (0..count)
            .map(|hour| {
                HourlySample::actual(
                    config.window.start() + Duration::hours(hour),
                    30. + (hour % 24) as f64 / 2.,
                    65.,
                )
            })
            .collect()
    }

    #[rstest]
    fn should_cover_every_hour_of_the_window(config: ForecastConfig) {
        let weather = WeatherInputs {
            historical: actual_hours(&config, 9 * 24 + 12),
            ..Default::default()
        };
        let report = forecast(&config, &weather).unwrap();

        assert_eq!(report.hours.total(), 30 * 24);
        assert_eq!(report.hours.actual, 9 * 24 + 12);
        assert_eq!(report.days.len(), 30);
        assert_eq!(report.months.len(), 1);
        assert_eq!(report.month.as_ref().unwrap().fixed_cost, Decimal::new(10, 0));
        assert!(report.has_estimated_hours);
        assert!(!report.days[0].has_estimated_hours);
        assert!(report.days[29].has_estimated_hours);
        assert!(!report.low_confidence);
        assert_eq!(report.hourly.len(), 30 * 24);
    }

    #[rstest]
    fn defaults_should_lower_confidence(mut config: ForecastConfig) {
        config.rate_lookup = lookup(ResolutionTier::BuiltInDefault);
        config.lookup_failures = vec![ProviderFailure {
            provider: "eia".to_string(),
            reason: "offline".to_string(),
        }];
        let report = forecast(&config, &WeatherInputs::default()).unwrap();

        assert!(report.low_confidence);
        assert!(report
            .data_quality
            .contains(&DataQualityNote::DefaultElectricityRate {
                rate: Decimal::new(15, 2)
            }));
        assert!(report
            .data_quality
            .contains(&DataQualityNote::ProviderFailed {
                provider: "eia".to_string(),
                reason: "offline".to_string()
            }));
    }

    #[rstest]
    fn should_reject_invalid_profile(mut config: ForecastConfig) {
        config.profile.rated_tons = 0.;
        let error = forecast(&config, &WeatherInputs::default()).unwrap_err();
        assert!(
            matches!(error, ForecastError::Configuration(ref e) if e.field() == "ratedTons")
        );
    }

    #[rstest]
    fn engine_should_memoise_identical_inputs(config: ForecastConfig) {
        let engine = ForecastEngine::new(2);
        let weather = WeatherInputs {
            historical: actual_hours(&config, 48),
            ..Default::default()
        };

        let first = engine.forecast(&config, &weather).unwrap();
        let second = engine.forecast(&config, &weather).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.len(), 1);

        let mut reseeded = config.clone();
        reseeded.generator.seed += 1;
        let third = engine.forecast(&reseeded, &weather).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(engine.len(), 2);
    }

    #[rstest]
    fn engine_should_evict_oldest_report(config: ForecastConfig) {
        let engine = ForecastEngine::new(1);
        let weather = WeatherInputs::default();
        let first = engine.forecast(&config, &weather).unwrap();

        let mut later = config.clone();
        later.now += Duration::hours(1);
        engine.forecast(&later, &weather).unwrap();
        assert_eq!(engine.len(), 1);

        let again = engine.forecast(&config, &weather).unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
    }
}
