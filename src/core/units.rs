use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Electrical resistance heat conversion, used for auxiliary strip heat.
pub const BTU_PER_KWH_RESISTANCE: f64 = 3412.;
/// Conversion used by the seasonal efficiency ratings (HSPF2 is BTU per Wh).
pub const BTU_PER_KWH: f64 = 3412.14;
pub const BTU_PER_HOUR_PER_TON: f64 = 12_000.;
pub const HOURS_PER_DAY: u32 = 24;
/// Temperature difference at which a "design" heat loss in BTU/hr is quoted.
pub const DESIGN_DELTA_T_F: f64 = 70.;

/// Decimal places kept when energy and rates move into money arithmetic.
pub(crate) const MONEY_SCALE: u32 = 6;

/// Convert a float quantity into a decimal for exact money arithmetic. Non-finite values become zero.
pub(crate) fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp(MONEY_SCALE)
}

pub fn celsius_to_fahrenheit(temp_c: f64) -> f64 {
    temp_c * 9. / 5. + 32.
}
