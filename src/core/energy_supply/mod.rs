pub mod cost;
pub mod state_data;
