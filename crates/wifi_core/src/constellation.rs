use crate::encoding::Encoding;
use num::complex::Complex32;

/// Constellation points for an encoding.
/// A point is addressed by the value of its bit label, where the first transmitted bit is the most significant.
#[derive(Debug, Clone, PartialEq)]
pub struct Constellation {
    pub encoding: Encoding,
    pub points: Vec<Complex32>,
    /// Number of bits carried by each point.
    pub nb_bpsc: usize,
    /// Half of the minimum distance between two neighbouring points.
    pub half_min_distance: f32,
    /// Largest odd multiple of the half minimum distance found along an axis.
    pub max_offset: u32,
}

// Clause 17.3.5.8 - Subcarrier modulation mapping
// Gray coded amplitude levels along one axis, indexed by the value of the axis bits
const QAM16_LEVELS: [f32; 4] = [-3.0, -1.0, 3.0, 1.0];
const QAM64_LEVELS: [f32; 8] = [-7.0, -5.0, -1.0, -3.0, 7.0, 5.0, 1.0, 3.0];

const QPSK_SCALE: f32 = std::f32::consts::FRAC_1_SQRT_2;
const QAM16_SCALE: f32 = 0.31622776; // 1/sqrt(10)
const QAM64_SCALE: f32 = 0.15430335; // 1/sqrt(42)

/// 8PSK points used by the constellation offset side channel.
pub const PSK8_POINTS: [Complex32; 8] = [
    Complex32::new(-QPSK_SCALE, -QPSK_SCALE),
    Complex32::new(-1.0, 0.0),
    Complex32::new(0.0, 1.0),
    Complex32::new(-QPSK_SCALE, QPSK_SCALE),
    Complex32::new(0.0, -1.0),
    Complex32::new(QPSK_SCALE, -QPSK_SCALE),
    Complex32::new(QPSK_SCALE, QPSK_SCALE),
    Complex32::new(1.0, 0.0),
];

impl Constellation {
    pub fn new(encoding: Encoding) -> Self {
        let (nb_bpsc, half_min_distance, max_offset) = match encoding {
            Encoding::Bpsk1_2 | Encoding::Bpsk3_4     => (1, 1.0, 1),
            Encoding::Qpsk1_2 | Encoding::Qpsk3_4     => (2, QPSK_SCALE, 1),
            Encoding::Qam16_1_2 | Encoding::Qam16_3_4 => (4, QAM16_SCALE, 3),
            Encoding::Qam64_2_3 | Encoding::Qam64_3_4 => (6, QAM64_SCALE, 7),
            Encoding::Psk8_1_2 => (3, (std::f32::consts::PI/8.0).sin(), 1),
        };

        let points = match encoding {
            Encoding::Bpsk1_2 | Encoding::Bpsk3_4 => {
                vec![Complex32::new(-1.0, 0.0), Complex32::new(1.0, 0.0)]
            },
            Encoding::Qpsk1_2 | Encoding::Qpsk3_4 => square_points(&[-1.0, 1.0], QPSK_SCALE),
            Encoding::Qam16_1_2 | Encoding::Qam16_3_4 => square_points(&QAM16_LEVELS, QAM16_SCALE),
            Encoding::Qam64_2_3 | Encoding::Qam64_3_4 => square_points(&QAM64_LEVELS, QAM64_SCALE),
            Encoding::Psk8_1_2 => PSK8_POINTS.to_vec(),
        };
        assert!(points.len() == 1 << nb_bpsc, "Constellation for {} has {} points but expected {}", encoding, points.len(), 1 << nb_bpsc);

        Self {
            encoding,
            points,
            nb_bpsc,
            half_min_distance,
            max_offset,
        }
    }

    /// Index of the closest point. Ties resolve to the lowest index.
    pub fn nearest(&self, x: Complex32) -> usize {
        nearest_point(&self.points, x)
    }
}

/// Index of the closest point in a point table. Ties resolve to the lowest index.
pub fn nearest_point(points: &[Complex32], x: Complex32) -> usize {
    let mut best_index = 0;
    let mut best_distance = f32::INFINITY;
    for (i, point) in points.iter().enumerate() {
        let distance = (x - point).norm_sqr();
        if distance < best_distance {
            best_distance = distance;
            best_index = i;
        }
    }
    best_index
}

/// Builds a square constellation where the upper half of the label picks the in-phase level
/// and the lower half picks the quadrature level.
fn square_points(levels: &[f32], scale: f32) -> Vec<Complex32> {
    let nb_levels = levels.len();
    (0..nb_levels*nb_levels)
        .map(|i| {
            let re = levels[i / nb_levels];
            let im = levels[i % nb_levels];
            Complex32::new(re*scale, im*scale)
        })
        .collect()
}
