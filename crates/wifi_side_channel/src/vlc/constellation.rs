use num::complex::Complex32;
use std::f64::consts::PI;
use wifi_core::error::{PhyError, PhyResult};

pub const SUPPORTED_ORDERS: [usize; 9] = [10, 12, 14, 20, 24, 28, 40, 48, 56];

/// A prefix codeword stored MSB first in the lowest `length` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codeword {
    pub bits: u32,
    pub length: usize,
}

impl Codeword {
    pub fn bit(&self, index: usize) -> u8 {
        assert!(index < self.length, "Bit {} is outside of a codeword of length {}", index, self.length);
        ((self.bits >> (self.length-1-index)) & 1) as u8
    }

    pub fn iter_bits(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.length).map(|i| self.bit(i))
    }
}

/// Rows and columns of the rectangular grid for each order.
fn get_grid_shape(order: usize) -> Option<(usize, usize)> {
    match order {
        10 => Some((2, 5)),
        12 => Some((3, 4)),
        14 => Some((2, 7)),
        20 => Some((4, 5)),
        24 => Some((4, 6)),
        28 => Some((4, 7)),
        40 => Some((5, 8)),
        48 => Some((6, 8)),
        56 => Some((7, 8)),
        _ => None,
    }
}

/// Point table, codebook and marker points for one constellation order.
/// Symbol `i` is sent on `points[i]` with `codewords[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VlcConstellation {
    pub order: usize,
    /// Centred rectangular grid with unit average energy, ordered by energy then angle.
    pub points: Vec<Complex32>,
    /// Canonical prefix code where the lowest energy points get the short codewords.
    pub codewords: Vec<Codeword>,
    /// The short and long codeword lengths.
    pub len_set: [usize; 2],
    /// PSK points for the marker symbols.
    pub marker_points: Vec<Complex32>,
    pub nb_marker_bits: usize,
}

impl VlcConstellation {
    pub fn new(order: usize) -> PhyResult<Self> {
        let (rows, cols) = get_grid_shape(order).ok_or(PhyError::UnsupportedVlcOrder(order))?;

        // Integer grid coordinates so equal energies compare exactly
        let mut grid: Vec<(i32, f64, i32, i32)> = Vec::with_capacity(order);
        for r in 0..rows {
            for c in 0..cols {
                let x = 2*(c as i32) - (cols as i32 - 1);
                let y = 2*(r as i32) - (rows as i32 - 1);
                let mut angle = (y as f64).atan2(x as f64);
                if angle < 0.0 {
                    angle += 2.0*PI;
                }
                grid.push((x*x + y*y, angle, x, y));
            }
        }
        grid.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        let average_energy = grid.iter().map(|p| p.0 as f64).sum::<f64>() / (order as f64);
        let scale = 1.0/average_energy.sqrt();
        let points = grid
            .iter()
            .map(|(_, _, x, y)| Complex32::new(((*x as f64)*scale) as f32, ((*y as f64)*scale) as f32))
            .collect();

        // Complete prefix code with 2^(L+1)-n codewords of length L and the rest of length L+1
        let short_length = order.ilog2() as usize;
        let nb_short = (1usize << (short_length+1)) - order;
        let codewords = (0..order)
            .map(|i| {
                if i < nb_short {
                    Codeword { bits: i as u32, length: short_length }
                } else {
                    Codeword { bits: (nb_short + i) as u32, length: short_length+1 }
                }
            })
            .collect();

        let nb_marker_bits = if order < 16 { 2 } else { 3 };
        let nb_markers = 1usize << nb_marker_bits;
        let marker_points = (0..nb_markers)
            .map(|k| {
                let phase = PI*(2.0*(k as f64) + 1.0)/(nb_markers as f64);
                Complex32::from_polar(1.0, phase as f32)
            })
            .collect();

        Ok(Self {
            order,
            points,
            codewords,
            len_set: [short_length, short_length+1],
            marker_points,
            nb_marker_bits,
        })
    }

    /// Marker period, which is also the modulus of the codeword length sum a marker carries.
    pub fn nb_markers(&self) -> usize {
        self.marker_points.len()
    }

    pub fn bit_length(&self, symbol: usize) -> usize {
        self.codewords[symbol].length
    }
}
