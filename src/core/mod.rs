pub mod climate;
pub mod cooling_systems;
pub mod energy_supply;
pub mod heating_systems;
pub(crate) mod solvers;
pub mod thermal_model;
pub mod units;
pub mod weather;
