use itertools::izip;

/// Block interleaver that spreads adjacent coded bits over non-adjacent subcarriers
/// and alternates them between more and less significant constellation bits.
#[derive(Debug, Clone)]
pub struct Interleaver {
    nb_cbps: usize,
    permutation: Vec<usize>,
}

impl Interleaver {
    pub fn new(nb_cbps: usize, nb_bpsc: usize) -> Self {
        assert!(nb_cbps > 0 && nb_cbps % 16 == 0, "Coded bits per symbol ({}) must be a multiple of 16", nb_cbps);
        assert!(nb_bpsc > 0, "Bits per subcarrier must be positive");

        // Clause 17.3.5.7 - Data interleaving
        let s = (nb_bpsc/2).max(1);
        let first: Vec<usize> = (0..nb_cbps)
            .map(|j| s*(j/s) + (j + (16*j)/nb_cbps) % s)
            .collect();
        let second: Vec<usize> = (0..nb_cbps)
            .map(|i| 16*i - (nb_cbps-1)*((16*i)/nb_cbps))
            .collect();
        let permutation = first.iter().map(|j| second[*j]).collect();

        Self {
            nb_cbps,
            permutation,
        }
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Transmit direction, applied to each block of `nb_cbps` bits.
    pub fn interleave<T: Copy>(&self, buf_in: &[T], buf_out: &mut [T]) {
        self.assert_lengths(buf_in.len(), buf_out.len());
        for (x, y) in izip!(buf_in.chunks_exact(self.nb_cbps), buf_out.chunks_exact_mut(self.nb_cbps)) {
            for (k, index) in self.permutation.iter().enumerate() {
                y[k] = x[*index];
            }
        }
    }

    /// Receive direction, the inverse of `interleave`.
    pub fn deinterleave<T: Copy>(&self, buf_in: &[T], buf_out: &mut [T]) {
        self.assert_lengths(buf_in.len(), buf_out.len());
        for (x, y) in izip!(buf_in.chunks_exact(self.nb_cbps), buf_out.chunks_exact_mut(self.nb_cbps)) {
            for (k, index) in self.permutation.iter().enumerate() {
                y[*index] = x[k];
            }
        }
    }

    fn assert_lengths(&self, length_in: usize, length_out: usize) {
        assert!(length_in == length_out, "Mismatching buffer lengths {} != {}", length_in, length_out);
        assert!(length_in % self.nb_cbps == 0, "Buffer length {} is not a multiple of {} coded bits", length_in, self.nb_cbps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINATIONS: [(usize, usize); 5] = [(48, 1), (96, 2), (144, 3), (192, 4), (288, 6)];

    #[test]
    fn test_permutation_is_bijection() {
        for (nb_cbps, nb_bpsc) in COMBINATIONS {
            let interleaver = Interleaver::new(nb_cbps, nb_bpsc);
            let mut seen = vec![false; nb_cbps];
            for index in interleaver.permutation() {
                assert!(!seen[*index], "Duplicate index {} for ({}, {})", index, nb_cbps, nb_bpsc);
                seen[*index] = true;
            }
        }
    }

    #[test]
    fn test_round_trip() {
        for (nb_cbps, nb_bpsc) in COMBINATIONS {
            let interleaver = Interleaver::new(nb_cbps, nb_bpsc);
            let data: Vec<u32> = (0..3*nb_cbps as u32).collect();
            let mut interleaved = vec![0; data.len()];
            let mut restored = vec![0; data.len()];
            interleaver.interleave(&data, &mut interleaved);
            interleaver.deinterleave(&interleaved, &mut restored);
            assert_eq!(restored, data);
            assert_ne!(interleaved, data);
        }
    }

    #[test]
    fn test_bpsk_spreads_adjacent_bits() {
        // With one bit per subcarrier, consecutive coded bits land 3 subcarriers apart
        let interleaver = Interleaver::new(48, 1);
        let data: Vec<usize> = (0..48).collect();
        let mut positions = vec![0; 48];
        interleaver.deinterleave(&data, &mut positions);
        assert_eq!(&positions[..4], &[0, 3, 6, 9]);
    }
}
