use crate::core::climate::{AnnualDegreeDays, ClimateNormals};
use crate::core::energy_supply::cost::Tariff;
use crate::core::heating_systems::heat_pump::HeatPumpEnergyMethod;
use crate::core::thermal_model::{
    design_heat_loss_btu, heat_loss_factor, ThermalProfile, ThermalSetpoints,
};
use crate::core::units::to_decimal;
use crate::core::weather::synthetic::GeneratorParams;
use crate::errors::ConfigurationError;
use crate::forecast::{ForecastConfig, LookupSummary};
use crate::forecast_window::ForecastWindow;
use crate::resolver::Resolved;
use crate::sources::Location;
use anyhow::anyhow;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::io::Read;

/// This module defines the JSON input for a forecast and turns it into a fully resolved
/// forecast configuration.

const DEFAULT_BASE_TEMPERATURE_F: f64 = 65.;
const MIN_BASELOAD_KWH_PER_DAY: f64 = 5.;
const MAX_BASELOAD_KWH_PER_DAY: f64 = 25.;
// Compressor draw in kW per ton of capacity at an HSPF2 of 1
const COMPRESSOR_KW_PER_TON_HSPF2: f64 = 15.;
// Hours a day the daytime winter setpoint is in force
const DAYTIME_HOURS: f64 = 16.;

pub fn ingest_for_processing(json: impl Read) -> anyhow::Result<ForecastInput> {
    let input: ForecastInput = serde_json::from_reader(json)?;
    input
        .validate()
        .map_err(|errors| anyhow!("Input failed validation: {errors}"))?;

    Ok(input)
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForecastInput {
    #[validate]
    #[serde(default)]
    pub home: HomeSettings,
    pub location: Location,
    #[serde(default)]
    pub window: WindowInput,
    /// Current location-local time. When absent the caller supplies the wall clock.
    #[serde(default)]
    pub now: Option<NaiveDateTime>,
    #[serde(default = "default_base_temperature_f")]
    #[validate(minimum = -40.)]
    #[validate(maximum = 100.)]
    pub heating_base_f: f64,
    #[serde(default = "default_base_temperature_f")]
    #[validate(minimum = -40.)]
    #[validate(maximum = 100.)]
    pub cooling_base_f: f64,
    #[serde(default)]
    pub generator: GeneratorParams,
}

fn default_base_temperature_f() -> f64 {
    DEFAULT_BASE_TEMPERATURE_F
}

/// The home and its equipment, named as in the thermostat app's settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HomeSettings {
    #[validate(minimum = 100.)]
    #[validate(maximum = 100000.)]
    pub square_feet: f64,
    #[validate(minimum = 0.1)]
    #[validate(maximum = 3.)]
    pub insulation_level: f64,
    #[validate(minimum = 0.5)]
    #[validate(maximum = 2.)]
    pub home_shape: f64,
    #[validate(minimum = 6.)]
    #[validate(maximum = 30.)]
    pub ceiling_height: f64,
    pub has_loft: bool,
    /// Heat loss factor in BTU/hr/°F, replacing the estimate from floor area and construction
    #[validate(exclusive_minimum = 0.)]
    pub manual_heat_loss: Option<f64>,
    /// Heat gain factor in BTU/hr/°F; defaults to the heat loss factor
    #[validate(minimum = 0.)]
    pub heat_gain_factor: Option<f64>,
    #[validate(exclusive_minimum = 0.)]
    #[validate(maximum = 20.)]
    pub heat_pump_tons: f64,
    #[validate(exclusive_minimum = 0.)]
    #[validate(maximum = 20.)]
    pub hspf2: f64,
    #[validate(exclusive_minimum = 0.)]
    #[validate(maximum = 40.)]
    pub seer2: f64,
    #[validate(exclusive_minimum = 0.)]
    pub compressor_power_kw: Option<f64>,
    #[validate(minimum = -60.)]
    #[validate(maximum = 60.)]
    pub cutoff_temp_f: f64,
    pub use_electric_aux_heat: bool,
    pub heat_pump_energy_method: HeatPumpEnergyMethod,
    #[validate(minimum = 0.)]
    #[validate(maximum = 3.)]
    pub solar_exposure_multiplier: f64,
    #[validate(minimum = 40.)]
    #[validate(maximum = 90.)]
    pub winter_thermostat_day: f64,
    #[validate(minimum = 40.)]
    #[validate(maximum = 90.)]
    pub winter_thermostat_night: f64,
    /// Electricity rate in $/kWh. When absent the rate is looked up for the location.
    #[validate(exclusive_minimum = 0.)]
    pub utility_cost: Option<f64>,
    /// Monthly fixed charge in dollars
    #[validate(minimum = 0.)]
    pub fixed_electric_cost: f64,
    #[validate(minimum = 0.)]
    pub baseload_kwh_per_day: f64,
}

impl Default for HomeSettings {
    fn default() -> Self {
        Self {
            square_feet: 1500.,
            insulation_level: 1.,
            home_shape: 1.,
            ceiling_height: 8.,
            has_loft: false,
            manual_heat_loss: None,
            heat_gain_factor: None,
            heat_pump_tons: 2.,
            hspf2: 9.,
            seer2: 15.,
            compressor_power_kw: None,
            cutoff_temp_f: -15.,
            use_electric_aux_heat: true,
            heat_pump_energy_method: HeatPumpEnergyMethod::default(),
            solar_exposure_multiplier: 1.,
            winter_thermostat_day: 70.,
            winter_thermostat_night: 68.,
            utility_cost: None,
            fixed_electric_cost: 0.,
            baseload_kwh_per_day: 10.,
        }
    }
}

impl HomeSettings {
    /// Heat loss factor in BTU/hr/°F: the manual figure if given, otherwise estimated from
    /// floor area and construction.
    pub fn heat_loss_factor(&self) -> f64 {
        self.manual_heat_loss.unwrap_or_else(|| {
            heat_loss_factor(design_heat_loss_btu(
                self.square_feet,
                self.insulation_level,
                self.home_shape,
                self.ceiling_height,
                self.has_loft,
            ))
        })
    }

    pub fn thermal_profile(&self) -> ThermalProfile {
        let heat_loss_factor = self.heat_loss_factor();
        ThermalProfile {
            heat_loss_factor_btu_per_hr_per_f: heat_loss_factor,
            heat_gain_factor_btu_per_hr_per_f: self.heat_gain_factor.unwrap_or(heat_loss_factor),
            rated_tons: self.heat_pump_tons,
            hspf2: self.hspf2,
            seer2: self.seer2,
            compressor_power_kw: self
                .compressor_power_kw
                .unwrap_or(self.heat_pump_tons * COMPRESSOR_KW_PER_TON_HSPF2 / self.hspf2),
            cutoff_temp_f: self.cutoff_temp_f,
            use_electric_aux: self.use_electric_aux_heat,
            solar_exposure_multiplier: self.solar_exposure_multiplier,
            heat_pump_energy_method: self.heat_pump_energy_method,
        }
    }

    /// Indoor heating target weighted over a 16 hour day and 8 hour night.
    pub fn indoor_heating_target_f(&self) -> f64 {
        let day_share = DAYTIME_HOURS / 24.;
        self.winter_thermostat_day * day_share + self.winter_thermostat_night * (1. - day_share)
    }

    pub fn clamped_baseload_kwh_per_day(&self) -> f64 {
        self.baseload_kwh_per_day
            .clamp(MIN_BASELOAD_KWH_PER_DAY, MAX_BASELOAD_KWH_PER_DAY)
    }

    /// The user's own electricity rate, which bypasses any lookup.
    pub fn user_electricity_rate(&self) -> Option<Decimal> {
        self.utility_cost.map(to_decimal)
    }
}

/// Which hours to forecast.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", deny_unknown_fields)]
pub enum WindowInput {
    /// From the current hour to the end of the current month
    #[default]
    RemainderOfMonth,
    Month {
        year: i32,
        month: u32,
    },
    Range {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl WindowInput {
    pub fn resolve(&self, now: NaiveDateTime) -> Result<ForecastWindow, ConfigurationError> {
        match *self {
            WindowInput::RemainderOfMonth => ForecastWindow::remainder_of_month(now),
            WindowInput::Month { year, month } => ForecastWindow::month(year, month),
            WindowInput::Range { start, end } => ForecastWindow::new(start, end),
        }
    }
}

impl ForecastInput {
    pub fn setpoints(&self) -> ThermalSetpoints {
        ThermalSetpoints {
            indoor_heating_target_f: self.home.indoor_heating_target_f(),
            heating_base_f: self.heating_base_f,
            cooling_base_f: self.cooling_base_f,
        }
    }

    /// Combine the input with the current time and the looked-up rate and climate into the
    /// configuration for one forecast run.
    pub fn into_config(
        self,
        now: NaiveDateTime,
        electricity_rate: Resolved<Decimal>,
        degree_days: Resolved<AnnualDegreeDays>,
    ) -> Result<ForecastConfig, ConfigurationError> {
        let now = self.now.unwrap_or(now);
        let window = self.window.resolve(now)?;
        let profile = self.home.thermal_profile();
        profile.validate()?;
        let setpoints = self.setpoints();
        setpoints.validate()?;
        ConfigurationError::require_non_negative(
            "fixedElectricCost",
            self.home.fixed_electric_cost,
        )?;

        let tariff = Tariff {
            electricity_rate: electricity_rate.value,
            monthly_fixed_charge: to_decimal(self.home.fixed_electric_cost),
            baseload_kwh_per_day: self.home.clamped_baseload_kwh_per_day(),
        };
        let climate =
            ClimateNormals::new(degree_days.value, self.heating_base_f, self.cooling_base_f);

        let lookup_failures = electricity_rate
            .failures
            .iter()
            .chain(&degree_days.failures)
            .cloned()
            .collect();

        Ok(ForecastConfig {
            location: self.location,
            window,
            now,
            profile,
            setpoints,
            tariff,
            climate,
            generator: self.generator,
            rate_lookup: LookupSummary::from(&electricity_rate),
            climate_lookup: LookupSummary::from(&degree_days),
            lookup_failures,
        })
    }
}
