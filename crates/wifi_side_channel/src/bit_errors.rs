use itertools::{EitherOrBoth, Itertools};

/// Bit error count of a decoded payload against the payload that was sent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BitErrorReport {
    pub nb_bit_errors: usize,
    pub nb_bits: usize,
}

impl BitErrorReport {
    pub fn ber(&self) -> f32 {
        if self.nb_bits == 0 {
            return 0.0;
        }
        (self.nb_bit_errors as f32) / (self.nb_bits as f32)
    }
}

/// Compares two byte strings bit by bit.
/// Bytes missing from either side count as eight errors each.
pub fn count_bit_errors(received: &[u8], expected: &[u8]) -> BitErrorReport {
    let nb_bit_errors = received
        .iter()
        .zip_longest(expected.iter())
        .map(|pair| match pair {
            EitherOrBoth::Both(x, y) => (x ^ y).count_ones() as usize,
            EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => 8,
        })
        .sum();
    BitErrorReport {
        nb_bit_errors,
        nb_bits: 8*received.len().max(expected.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_flipped_bits() {
        let report = count_bit_errors(&[0b1010_0000, 0xFF], &[0b0010_0001, 0xFF]);
        assert_eq!(report, BitErrorReport { nb_bit_errors: 2, nb_bits: 16 });
        assert!((report.ber() - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch() {
        let report = count_bit_errors(&[0x00], &[0x00, 0x00, 0x00]);
        assert_eq!(report, BitErrorReport { nb_bit_errors: 16, nb_bits: 24 });
        assert_eq!(count_bit_errors(&[], &[]).ber(), 0.0);
    }
}
