//! Variable length coded constellations.
//!
//! Bits are mapped onto constellations whose size is not a power of two using a prefix code,
//! so that inner points carry one bit less than outer points.
//! Every `nb_markers`-th subcarrier is a marker that carries the total codeword length of the
//! preceding data symbols, which lets the receiver fix decisions that would shift the bit stream.

pub mod constellation;
pub mod frame;
pub mod modulator;
pub mod tree;
