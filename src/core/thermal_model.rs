use crate::core::cooling_systems::air_conditioning::AirConditioning;
use crate::core::heating_systems::heat_pump::{
    CapacityCurve, DerateCurve, HeatPump, HeatPumpEnergyMethod,
};
use crate::core::solvers::first_descending;
use crate::core::units::{BTU_PER_HOUR_PER_TON, BTU_PER_KWH_RESISTANCE, DESIGN_DELTA_T_F};
use crate::core::weather::HourlySample;
use crate::errors::ConfigurationError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// This module combines the building envelope with the heat pump, auxiliary resistance heat
/// and air conditioning to give per-hour energy use.

const BALANCE_POINT_SEARCH_START_F: f64 = 60.;
const BALANCE_POINT_SEARCH_STOP_F: f64 = -20.;
const BALANCE_POINT_SEARCH_STEP_F: f64 = 1.;

/// Thermal characteristics of a home and its HVAC equipment, fixed for one forecast run.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalProfile {
    pub heat_loss_factor_btu_per_hr_per_f: f64,
    pub heat_gain_factor_btu_per_hr_per_f: f64,
    pub rated_tons: f64,
    pub hspf2: f64,
    pub seer2: f64,
    pub compressor_power_kw: f64,
    pub cutoff_temp_f: f64,
    pub use_electric_aux: bool,
    pub solar_exposure_multiplier: f64,
    pub heat_pump_energy_method: HeatPumpEnergyMethod,
}

impl ThermalProfile {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive(
            "heatLossFactorBtuPerHrPerF",
            self.heat_loss_factor_btu_per_hr_per_f,
        )?;
        ConfigurationError::require_non_negative(
            "heatGainFactorBtuPerHrPerF",
            self.heat_gain_factor_btu_per_hr_per_f,
        )?;
        ConfigurationError::require_positive("ratedTons", self.rated_tons)?;
        ConfigurationError::require_positive("hspf2", self.hspf2)?;
        ConfigurationError::require_positive("seer2", self.seer2)?;
        ConfigurationError::require_positive("compressorPowerKw", self.compressor_power_kw)?;
        ConfigurationError::require_non_negative(
            "solarExposureMultiplier",
            self.solar_exposure_multiplier,
        )?;
        if !self.cutoff_temp_f.is_finite() {
            return Err(ConfigurationError::new("cutoffTempF", "must be a finite temperature"));
        }
        Ok(())
    }
}

/// Indoor target and the outdoor temperatures that switch heating and cooling on.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalSetpoints {
    pub indoor_heating_target_f: f64,
    pub heating_base_f: f64,
    pub cooling_base_f: f64,
}

impl ThermalSetpoints {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (field, value) in [
            ("indoorHeatingTargetF", self.indoor_heating_target_f),
            ("heatingBaseF", self.heating_base_f),
            ("coolingBaseF", self.cooling_base_f),
        ] {
            if !value.is_finite() {
                return Err(ConfigurationError::new(field, "must be a finite temperature"));
            }
        }
        if self.heating_base_f > self.cooling_base_f {
            return Err(ConfigurationError::new(
                "heatingBaseF",
                format!(
                    "heating base {} is above cooling base {}",
                    self.heating_base_f, self.cooling_base_f
                ),
            ));
        }
        Ok(())
    }
}

/// Energy drawn in one hour, in kWh.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPerformance {
    pub heat_pump_kwh: f64,
    pub aux_kwh: f64,
    pub cooling_kwh: f64,
}

impl HourlyPerformance {
    pub fn heating_kwh(&self) -> f64 {
        self.heat_pump_kwh + self.aux_kwh
    }

    pub fn total_kwh(&self) -> f64 {
        self.heating_kwh() + self.cooling_kwh
    }
}

/// Design heat loss in BTU/hr at a 70°F indoor/outdoor difference, estimated from floor
/// area and construction. A loft over a 1.2-shape home heats only 65% of its floor area.
pub fn design_heat_loss_btu(
    square_feet: f64,
    insulation_level: f64,
    home_shape: f64,
    ceiling_height_ft: f64,
    has_loft: bool,
) -> f64 {
    let ceiling_multiplier = 1. + (ceiling_height_ft - 8.) * 0.1;
    let effective_square_feet = if has_loft && (1.2..1.3).contains(&home_shape) {
        square_feet * 0.65
    } else {
        square_feet
    };
    let raw = effective_square_feet * 22.67 * insulation_level * home_shape * ceiling_multiplier;

    (raw / 1000.).round() * 1000.
}

/// Heat loss factor (BTU/hr/°F) from a design heat loss.
pub fn heat_loss_factor(design_heat_loss_btu: f64) -> f64 {
    design_heat_loss_btu / DESIGN_DELTA_T_F
}

/// Per-hour heat-pump, auxiliary and cooling energy for one profile and indoor target. The
/// balance point is found once, on construction.
#[derive(Debug)]
pub struct ThermalPerformanceModel<C = DerateCurve> {
    profile: ThermalProfile,
    setpoints: ThermalSetpoints,
    heat_pump: HeatPump<C>,
    air_conditioning: AirConditioning,
    balance_point_f: Option<f64>,
}

impl ThermalPerformanceModel<DerateCurve> {
    pub fn new(
        profile: ThermalProfile,
        setpoints: ThermalSetpoints,
    ) -> Result<Self, ConfigurationError> {
        Self::with_capacity_curve(profile, setpoints, DerateCurve)
    }
}

impl<C: CapacityCurve> ThermalPerformanceModel<C> {
    pub fn with_capacity_curve(
        profile: ThermalProfile,
        setpoints: ThermalSetpoints,
        capacity_curve: C,
    ) -> Result<Self, ConfigurationError> {
        profile.validate()?;
        setpoints.validate()?;

        let heat_pump = HeatPump::new(
            profile.rated_tons,
            profile.compressor_power_kw,
            profile.hspf2,
            profile.cutoff_temp_f,
            profile.heat_pump_energy_method,
            capacity_curve,
        );
        let air_conditioning = AirConditioning::new(
            profile.heat_gain_factor_btu_per_hr_per_f,
            profile.seer2,
            profile.solar_exposure_multiplier,
        );

        let mut model = Self {
            profile,
            setpoints,
            heat_pump,
            air_conditioning,
            balance_point_f: None,
        };
        let balance_point_f = first_descending(
            BALANCE_POINT_SEARCH_START_F,
            BALANCE_POINT_SEARCH_STOP_F,
            BALANCE_POINT_SEARCH_STEP_F,
            |outdoor_temp_f| {
                model.rated_output_btu(outdoor_temp_f) <= model.building_loss_btu(outdoor_temp_f)
            },
        );
        model.balance_point_f = balance_point_f;
        debug!(?balance_point_f, "found heat pump balance point");

        Ok(model)
    }

    /// Highest whole-degree outdoor temperature at which the heat pump alone can no longer
    /// offset building loss, if any in the search range.
    pub fn balance_point_f(&self) -> Option<f64> {
        self.balance_point_f
    }

    /// Building heat loss, in BTU/hr, at an outdoor temperature.
    pub fn building_loss_btu(&self, outdoor_temp_f: f64) -> f64 {
        self.profile.heat_loss_factor_btu_per_hr_per_f
            * (self.setpoints.indoor_heating_target_f - outdoor_temp_f).max(0.)
    }

    /// Heat-pump output available, in BTU/hr, at an outdoor temperature.
    pub fn rated_output_btu(&self, outdoor_temp_f: f64) -> f64 {
        self.profile.rated_tons
            * BTU_PER_HOUR_PER_TON
            * self.heat_pump.capacity_factor(outdoor_temp_f)
    }

    pub fn hourly_performance(&self, sample: &HourlySample) -> HourlyPerformance {
        let outdoor_temp_f = sample.outdoor_temp_f();

        if outdoor_temp_f < self.setpoints.heating_base_f {
            let loss_btu = self.building_loss_btu(outdoor_temp_f);
            let hour = self
                .heat_pump
                .run_hour(loss_btu, outdoor_temp_f, sample.relative_humidity_pct());
            let at_or_below_balance_point = self
                .balance_point_f
                .is_some_and(|balance_point_f| outdoor_temp_f <= balance_point_f);
            let aux_kwh = if at_or_below_balance_point && self.profile.use_electric_aux {
                hour.deficit_btu / BTU_PER_KWH_RESISTANCE
            } else {
                0.
            };

            HourlyPerformance {
                heat_pump_kwh: hour.energy_kwh,
                aux_kwh,
                cooling_kwh: 0.,
            }
        } else if outdoor_temp_f > self.setpoints.cooling_base_f {
            HourlyPerformance {
                cooling_kwh: self
                    .air_conditioning
                    .demand_energy(outdoor_temp_f, self.setpoints.cooling_base_f),
                ..Default::default()
            }
        } else {
            HourlyPerformance::default()
        }
    }

    /// Evaluate every hour of a timeline, in parallel, preserving order.
    pub fn timeline_performance(&self, samples: &[HourlySample]) -> Vec<HourlyPerformance> {
        samples
            .par_iter()
            .map(|sample| self.hourly_performance(sample))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use interp::{interp, InterpMode};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn sample(outdoor_temp_f: f64) -> HourlySample {
        let time = NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();
        HourlySample::actual(time, outdoor_temp_f, 60.)
    }

    #[fixture]
    fn profile() -> ThermalProfile {
        ThermalProfile {
            heat_loss_factor_btu_per_hr_per_f: 314.,
            heat_gain_factor_btu_per_hr_per_f: 314.,
            rated_tons: 3.,
            hspf2: 9.,
            seer2: 16.,
            compressor_power_kw: 5.,
            cutoff_temp_f: -15.,
            use_electric_aux: true,
            solar_exposure_multiplier: 1.,
            heat_pump_energy_method: HeatPumpEnergyMethod::CompressorRuntime,
        }
    }

    #[fixture]
    fn setpoints() -> ThermalSetpoints {
        ThermalSetpoints {
            indoor_heating_target_f: 68.,
            heating_base_f: 65.,
            cooling_base_f: 65.,
        }
    }

    // Capacity factor of 0.8 at 20°F and 0.4 at -10°F.
    fn scenario_curve(outdoor_temp_f: f64, cutoff_temp_f: f64) -> f64 {
        if outdoor_temp_f <= cutoff_temp_f {
            return 0.;
        }
        interp(&[-15., -10., 20., 47.], &[0., 0.4, 0.8, 1.], outdoor_temp_f, &InterpMode::default()).clamp(0., 1.)
    }

    #[rstest]
    fn test_scenario_mild_heating_hour(profile: ThermalProfile, setpoints: ThermalSetpoints) {
        let model =
            ThermalPerformanceModel::with_capacity_curve(profile, setpoints, scenario_curve)
                .unwrap();
        assert_relative_eq!(model.rated_output_btu(20.), 28_800., epsilon = 1e-6);
        assert_relative_eq!(model.building_loss_btu(20.), 15_072.);

        let performance = model.hourly_performance(&sample(20.));
        assert_eq!(performance.aux_kwh, 0.);
        assert_relative_eq!(performance.heat_pump_kwh, 5. * 15_072. / 28_800., epsilon = 1e-6);
        assert_eq!(performance.cooling_kwh, 0.);
    }

    #[rstest]
    fn test_scenario_cold_heating_hour(profile: ThermalProfile, setpoints: ThermalSetpoints) {
        let model =
            ThermalPerformanceModel::with_capacity_curve(profile, setpoints, scenario_curve)
                .unwrap();
        assert_eq!(model.balance_point_f(), Some(2.));
        assert_relative_eq!(model.rated_output_btu(-10.), 14_400., epsilon = 1e-6);
        assert_relative_eq!(model.building_loss_btu(-10.), 24_492.);

        let performance = model.hourly_performance(&sample(-10.));
        assert_relative_eq!(performance.aux_kwh, 10_092. / 3412., epsilon = 1e-6);
        assert_relative_eq!(performance.aux_kwh, 2.96, epsilon = 0.01);
        assert_relative_eq!(performance.heat_pump_kwh, 5.);
    }

    #[rstest]
    fn test_aux_covers_deficit_at_balance_point(
        profile: ThermalProfile,
        setpoints: ThermalSetpoints,
    ) {
        let model =
            ThermalPerformanceModel::with_capacity_curve(profile, setpoints, scenario_curve)
                .unwrap();
        assert_eq!(model.balance_point_f(), Some(2.));
        // 0.56 of 36,000 BTU/hr against 314 × 66
        assert_relative_eq!(model.rated_output_btu(2.), 20_160., epsilon = 1e-6);
        assert_relative_eq!(model.building_loss_btu(2.), 20_724.);

        let performance = model.hourly_performance(&sample(2.));
        assert_relative_eq!(performance.aux_kwh, 564. / 3412., epsilon = 1e-6);
        assert_relative_eq!(performance.heat_pump_kwh, 5.);
    }

    #[rstest]
    fn test_aux_disabled(mut profile: ThermalProfile, setpoints: ThermalSetpoints) {
        profile.use_electric_aux = false;
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        assert_eq!(model.hourly_performance(&sample(-10.)).aux_kwh, 0.);
    }

    #[rstest]
    #[case(150., 3.)]
    #[case(314., 3.)]
    #[case(500., 2.)]
    #[case(800., 4.)]
    fn test_balance_point_crossover(
        mut profile: ThermalProfile,
        setpoints: ThermalSetpoints,
        #[case] loss_factor: f64,
        #[case] tons: f64,
    ) {
        profile.heat_loss_factor_btu_per_hr_per_f = loss_factor;
        profile.rated_tons = tons;
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        let balance_point = model.balance_point_f().unwrap();

        assert!(model.rated_output_btu(balance_point) <= model.building_loss_btu(balance_point));
        if balance_point < 60. {
            let above = balance_point + 1.;
            assert!(model.rated_output_btu(above) > model.building_loss_btu(above));
        }
    }

    #[rstest]
    fn test_no_aux_above_balance_point(profile: ThermalProfile, setpoints: ThermalSetpoints) {
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        let balance_point = model.balance_point_f().unwrap();
        let performance = model.hourly_performance(&sample(balance_point + 0.5));
        assert_eq!(performance.aux_kwh, 0.);
    }

    #[rstest]
    fn test_cooling_hour(profile: ThermalProfile, setpoints: ThermalSetpoints) {
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        let performance = model.hourly_performance(&sample(85.));
        assert_relative_eq!(performance.cooling_kwh, 314. * 20. / 16_000.);
        assert_eq!(performance.heating_kwh(), 0.);
    }

    #[rstest]
    fn test_neither_branch_at_base(profile: ThermalProfile, setpoints: ThermalSetpoints) {
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        assert_eq!(
            model.hourly_performance(&sample(65.)),
            HourlyPerformance::default()
        );
    }

    #[rstest]
    fn test_dead_band_between_bases(profile: ThermalProfile) {
        let setpoints = ThermalSetpoints {
            indoor_heating_target_f: 68.,
            heating_base_f: 60.,
            cooling_base_f: 72.,
        };
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        assert_eq!(model.hourly_performance(&sample(66.)).total_kwh(), 0.);
    }

    #[rstest]
    fn test_timeline_performance_preserves_order(
        profile: ThermalProfile,
        setpoints: ThermalSetpoints,
    ) {
        let model = ThermalPerformanceModel::new(profile, setpoints).unwrap();
        let samples = [sample(85.), sample(-10.), sample(65.)];
        let performance = model.timeline_performance(&samples);
        assert_eq!(performance.len(), 3);
        assert!(performance[0].cooling_kwh > 0.);
        assert!(performance[1].aux_kwh > 0.);
        assert_eq!(performance[2], HourlyPerformance::default());
    }

    #[rstest]
    #[case::tons("ratedTons")]
    #[case::seer("seer2")]
    #[case::hspf("hspf2")]
    #[case::loss("heatLossFactorBtuPerHrPerF")]
    #[case::compressor("compressorPowerKw")]
    fn test_non_positive_values_name_the_field(
        mut profile: ThermalProfile,
        setpoints: ThermalSetpoints,
        #[case] field: &str,
    ) {
        match field {
            "ratedTons" => profile.rated_tons = 0.,
            "seer2" => profile.seer2 = -1.,
            "hspf2" => profile.hspf2 = 0.,
            "heatLossFactorBtuPerHrPerF" => profile.heat_loss_factor_btu_per_hr_per_f = 0.,
            "compressorPowerKw" => profile.compressor_power_kw = f64::NAN,
            _ => unreachable!(),
        }
        let error = ThermalPerformanceModel::new(profile, setpoints).unwrap_err();
        assert_eq!(error.field(), field);
    }

    #[rstest]
    #[case(1500., 1., 1., 8., false, 34_000.)]
    #[case(2000., 1.2, 1.25, 8., true, 44_000.)]
    #[case(1800., 0.65, 1., 10., false, 32_000.)]
    fn test_design_heat_loss(
        #[case] square_feet: f64,
        #[case] insulation: f64,
        #[case] shape: f64,
        #[case] ceiling: f64,
        #[case] has_loft: bool,
        #[case] expected: f64,
    ) {
        assert_eq!(
            design_heat_loss_btu(square_feet, insulation, shape, ceiling, has_loft),
            expected
        );
    }
}
