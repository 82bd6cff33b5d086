pub mod heat_pump;
