pub mod amplitude_mask;
pub mod bit_errors;
pub mod constellation_offset;
pub mod demo_payload;
pub mod sector_varrate;
pub mod side_config;
pub mod vlc;
pub mod zero_subcarrier;
