use crate::core::units::{BTU_PER_HOUR_PER_TON, BTU_PER_KWH};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use strum::Display;

/// This module provides objects to represent an air-source heat pump: its capacity derating
/// with outdoor temperature, its COP curve scaled to a seasonal HSPF2 rating and the defrost
/// penalty paid in cold, humid air.

/// Fraction of rated heat-pump output available at an outdoor temperature.
pub trait CapacityCurve: Send + Sync {
    /// Capacity factor in `[0, 1]` at `outdoor_temp_f`, given the compressor cutoff.
    fn factor(&self, outdoor_temp_f: f64, cutoff_temp_f: f64) -> f64;
}

impl<F> CapacityCurve for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn factor(&self, outdoor_temp_f: f64, cutoff_temp_f: f64) -> f64 {
        self(outdoor_temp_f, cutoff_temp_f)
    }
}

/// Piecewise-linear derate typical of a cold-climate unit: full output at and above 47°F,
/// 64% at 17°F, falling a point per degree below that and nothing at or below the cutoff.
#[derive(Clone, Copy, Debug, Default)]
pub struct DerateCurve;

const RATING_POINT_HIGH_F: f64 = 47.;
const RATING_POINT_LOW_F: f64 = 17.;

impl CapacityCurve for DerateCurve {
    fn factor(&self, outdoor_temp_f: f64, cutoff_temp_f: f64) -> f64 {
        if outdoor_temp_f <= cutoff_temp_f {
            0.
        } else if outdoor_temp_f >= RATING_POINT_HIGH_F {
            1.
        } else if outdoor_temp_f < RATING_POINT_LOW_F {
            (0.64 - (RATING_POINT_LOW_F - outdoor_temp_f) * 0.01).max(0.)
        } else {
            1. - (RATING_POINT_HIGH_F - outdoor_temp_f) * 0.012
        }
    }
}

/// Outdoor temperature bins (°F) and hours per bin of a reference heating season, used to
/// weight the COP curve when matching it to an HSPF2 rating.
const HSPF2_BIN_HOURS: [(f64, f64); 16] = [
    (62., 87.),
    (57., 183.),
    (52., 294.),
    (47., 358.),
    (42., 415.),
    (37., 460.),
    (33., 430.),
    (28., 407.),
    (23., 311.),
    (18., 239.),
    (13., 152.),
    (8., 91.),
    (3., 47.),
    (-2., 20.),
    (-7., 8.),
    (-13., 3.),
];

lazy_static! {
    static ref BASE_SEASONAL_COP: f64 = {
        let (weighted, hours) = HSPF2_BIN_HOURS
            .iter()
            .fold((0., 0.), |(weighted, hours), (temp, bin_hours)| {
                (weighted + unscaled_cop(*temp) * bin_hours, hours + bin_hours)
            });
        weighted / hours
    };
}

fn unscaled_cop(outdoor_temp_f: f64) -> f64 {
    if outdoor_temp_f >= RATING_POINT_HIGH_F {
        4.8
    } else if outdoor_temp_f >= RATING_POINT_LOW_F {
        4.8 - (RATING_POINT_HIGH_F - outdoor_temp_f) * 0.0867
    } else {
        (2.2 - (RATING_POINT_LOW_F - outdoor_temp_f) * 0.02).max(1.2)
    }
}

/// COP against outdoor temperature, scaled so its bin-weighted seasonal average matches an
/// HSPF2 rating.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CopCurve {
    scale: f64,
}

impl CopCurve {
    pub fn for_hspf2(hspf2: f64) -> Self {
        let target_seasonal_cop = hspf2 * 1000. / BTU_PER_KWH;
        Self {
            scale: target_seasonal_cop / *BASE_SEASONAL_COP,
        }
    }

    pub fn cop(&self, outdoor_temp_f: f64) -> f64 {
        unscaled_cop(outdoor_temp_f) * self.scale
    }

    /// Seasonal COP over the reference bins; equals the HSPF2 rating expressed as a COP.
    pub fn seasonal_cop(&self) -> f64 {
        let (weighted, hours) = HSPF2_BIN_HOURS
            .iter()
            .fold((0., 0.), |(weighted, hours), (temp, bin_hours)| {
                (weighted + self.cop(*temp) * bin_hours, hours + bin_hours)
            });
        weighted / hours
    }
}

/// Energy multiplier (1.0 to 2.0) for time lost to defrost cycles. Frosting is worst just
/// above freezing in saturated air and negligible in warm or very cold dry air.
pub fn defrost_penalty(outdoor_temp_f: f64, relative_humidity_pct: f64) -> f64 {
    let rh = relative_humidity_pct / 100.;
    let t = outdoor_temp_f;
    let in_frost_band = (36. ..=40.).contains(&t);

    let temp_mult = if in_frost_band {
        1.
    } else if t > 40. && t <= 45. {
        1. - ((t - 40.) / 5.) * 0.5
    } else if (32. ..36.).contains(&t) {
        1. - ((36. - t) / 4.) * 0.1
    } else if (20. ..32.).contains(&t) {
        0.9 - ((32. - t) / 12.) * 0.3
    } else if t < 20. {
        (0.6 - ((20. - t) / 30.) * 0.4).max(0.2)
    } else if t > 45. && t <= 50. {
        0.5 - ((t - 45.) / 5.) * 0.4
    } else if t > 50. {
        0.1
    } else {
        1.
    };

    let base_penalty = match (in_frost_band, rh) {
        (true, rh) if rh >= 0.90 => 0.20,
        (true, rh) if rh >= 0.80 => 0.18,
        _ => 0.15,
    };
    let mut penalty = base_penalty * rh * temp_mult;
    if rh >= 0.95 && (32. ..=42.).contains(&t) {
        penalty += (rh - 0.95) * 0.10 * temp_mult;
    }

    (1. + penalty).clamp(1., 2.)
}

/// How heat-pump electrical energy is derived from delivered heat.
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HeatPumpEnergyMethod {
    /// Rated compressor power times the fraction of the hour the compressor runs.
    #[default]
    CompressorRuntime,
    /// Delivered heat divided by the temperature- and defrost-adjusted COP.
    Cop,
}

const MIN_EFFECTIVE_COP: f64 = 0.5;

/// Result of running the heat pump against one hour of building loss.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeatPumpHour {
    pub available_btu: f64,
    pub delivered_btu: f64,
    pub deficit_btu: f64,
    pub runtime_fraction: f64,
    pub energy_kwh: f64,
}

#[derive(Clone, Debug)]
pub struct HeatPump<C = DerateCurve> {
    rated_tons: f64,
    compressor_power_kw: f64,
    cutoff_temp_f: f64,
    cop_curve: CopCurve,
    energy_method: HeatPumpEnergyMethod,
    capacity_curve: C,
}

impl<C: CapacityCurve> HeatPump<C> {
    /// Construct a heat pump
    ///
    /// Arguments:
    /// * `rated_tons` - nominal capacity, 1 ton = 12,000 BTU/hr
    /// * `compressor_power_kw` - electrical draw with the compressor running flat out
    /// * `hspf2` - seasonal heating efficiency rating
    /// * `cutoff_temp_f` - outdoor temperature at or below which the compressor locks out
    /// * `energy_method` - how electrical energy is derived from delivered heat
    /// * `capacity_curve` - derate of rated output with outdoor temperature
    pub(crate) fn new(
        rated_tons: f64,
        compressor_power_kw: f64,
        hspf2: f64,
        cutoff_temp_f: f64,
        energy_method: HeatPumpEnergyMethod,
        capacity_curve: C,
    ) -> Self {
        Self {
            rated_tons,
            compressor_power_kw,
            cutoff_temp_f,
            cop_curve: CopCurve::for_hspf2(hspf2),
            energy_method,
            capacity_curve,
        }
    }

    pub fn capacity_factor(&self, outdoor_temp_f: f64) -> f64 {
        self.capacity_curve
            .factor(outdoor_temp_f, self.cutoff_temp_f)
            .clamp(0., 1.)
    }

    /// Heat output available this hour, in BTU/hr.
    pub fn available_output_btu(&self, outdoor_temp_f: f64) -> f64 {
        self.rated_tons * BTU_PER_HOUR_PER_TON * self.capacity_factor(outdoor_temp_f)
    }

    pub fn cop_curve(&self) -> &CopCurve {
        &self.cop_curve
    }

    /// Run the heat pump against `loss_btu` of building loss for one hour.
    pub fn run_hour(
        &self,
        loss_btu: f64,
        outdoor_temp_f: f64,
        relative_humidity_pct: f64,
    ) -> HeatPumpHour {
        let available_btu = self.available_output_btu(outdoor_temp_f);
        let loss_btu = loss_btu.max(0.);
        let delivered_btu = loss_btu.min(available_btu);
        let runtime_fraction = if available_btu > 0. {
            (loss_btu / available_btu).min(1.)
        } else {
            0.
        };

        let energy_kwh = match self.energy_method {
            HeatPumpEnergyMethod::CompressorRuntime => self.compressor_power_kw * runtime_fraction,
            HeatPumpEnergyMethod::Cop if delivered_btu > 0. => {
                let effective_cop = (self.cop_curve.cop(outdoor_temp_f)
                    / defrost_penalty(outdoor_temp_f, relative_humidity_pct))
                .max(MIN_EFFECTIVE_COP);
                delivered_btu / (effective_cop * BTU_PER_KWH)
            }
            HeatPumpEnergyMethod::Cop => 0.,
        };

        HeatPumpHour {
            available_btu,
            delivered_btu,
            deficit_btu: (loss_btu - available_btu).max(0.),
            runtime_fraction,
            energy_kwh,
        }
    }
}
