/// This module provides objects to represent air conditioning.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AirConditioning {
    heat_gain_factor: f64,
    seer2: f64,
    solar_exposure_multiplier: f64,
}

impl AirConditioning {
    /// Construct an air conditioning object
    ///
    /// Arguments:
    /// * `heat_gain_factor` - building heat gain, in BTU/hr per °F above the cooling base
    /// * `seer2` - seasonal cooling efficiency, BTU of heat removed per Wh
    /// * `solar_exposure_multiplier` - scales gains for shading or sun exposure
    pub(crate) fn new(heat_gain_factor: f64, seer2: f64, solar_exposure_multiplier: f64) -> Self {
        Self {
            heat_gain_factor,
            seer2,
            solar_exposure_multiplier,
        }
    }

    /// Electrical energy (kWh) to remove one hour of gains at `outdoor_temp_f`. Nothing is
    /// drawn at or below `cooling_base_f`.
    pub fn demand_energy(&self, outdoor_temp_f: f64, cooling_base_f: f64) -> f64 {
        if outdoor_temp_f <= cooling_base_f {
            return 0.;
        }
        let gain_btu =
            self.heat_gain_factor * (outdoor_temp_f - cooling_base_f) * self.solar_exposure_multiplier;

        gain_btu / (self.seer2 * 1000.)
    }
}
