pub mod constellation;
pub mod encoding;
pub mod error;
pub mod ofdm_parameters;
pub mod tx_parameters;
