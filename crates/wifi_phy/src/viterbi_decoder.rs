use crate::convolutional_encoder::{parity, GENERATOR_A, GENERATOR_B};

const NB_STATES: usize = 64;
const UNREACHABLE_METRIC: f32 = -1.0e30;

#[derive(Debug, Clone, Copy)]
pub struct ViterbiSettings {
    /// Number of steps the survivor path is traced back before a bit is released.
    pub truncation_length: usize,
}

impl Default for ViterbiSettings {
    fn default() -> Self {
        Self {
            truncation_length: 30,
        }
    }
}

/// Soft decision decoder for the K=7 rate 1/2 code.
///
/// Soft values use the convention +1 for a logical 0 and -1 for a logical 1.
/// Erasures from depuncturing are 0.0 and contribute nothing to the path metric.
/// The encoder is assumed to start and finish in the all zero state.
pub struct ViterbiDecoder {
    pub settings: ViterbiSettings,
    /// Expected soft value of output A and B for each 7 bit encoder register.
    branch_table: [[f32; 2]; 2*NB_STATES],
    metrics: [f32; NB_STATES],
    next_metrics: [f32; NB_STATES],
    /// Bit i of entry t holds the discarded MSB of the survivor predecessor of state i at step t.
    decisions: Vec<u64>,
}

impl Default for ViterbiDecoder {
    fn default() -> Self {
        Self::new(ViterbiSettings::default())
    }
}

impl ViterbiDecoder {
    pub fn new(settings: ViterbiSettings) -> Self {
        assert!(settings.truncation_length > 0, "Truncation length must be positive");
        let mut branch_table = [[0.0f32; 2]; 2*NB_STATES];
        for (register, branch) in branch_table.iter_mut().enumerate() {
            let register = register as u8;
            branch[0] = soft_value(parity(register & GENERATOR_A));
            branch[1] = soft_value(parity(register & GENERATOR_B));
        }

        Self {
            settings,
            branch_table,
            metrics: [UNREACHABLE_METRIC; NB_STATES],
            next_metrics: [UNREACHABLE_METRIC; NB_STATES],
            decisions: vec![],
        }
    }

    /// Decodes pairs of soft values into bits.
    /// Bits are released with a sliding traceback from the best state, and the final
    /// traceback starts from the zero state since the tail bits flush the encoder.
    pub fn decode(&mut self, soft_in: &[f32], bits_out: &mut [u8]) {
        assert!(soft_in.len() == 2*bits_out.len(), "Expected {} soft values for {} bits but got {}", 2*bits_out.len(), bits_out.len(), soft_in.len());
        let nb_bits = bits_out.len();
        let depth = self.settings.truncation_length;

        self.metrics.fill(UNREACHABLE_METRIC);
        self.metrics[0] = 0.0;
        self.decisions.clear();
        self.decisions.resize(nb_bits, 0);

        for (step, pair) in soft_in.chunks_exact(2).enumerate() {
            self.update_metrics(step, pair[0], pair[1]);
            if step >= depth {
                let best_state = self.get_best_state();
                let state = self.traceback(best_state, step, depth);
                bits_out[step-depth] = (state & 1) as u8;
            }
        }

        // Flush whatever the sliding window has not released
        let mut state = 0usize;
        for step in (0..nb_bits).rev() {
            if step + depth < nb_bits {
                break;
            }
            bits_out[step] = (state & 1) as u8;
            state = self.get_predecessor(state, step);
        }
    }

    fn update_metrics(&mut self, step: usize, soft_a: f32, soft_b: f32) {
        let mut decision: u64 = 0;
        for next_state in 0..NB_STATES {
            let mut best_metric = f32::NEG_INFINITY;
            let mut best_msb = 0;
            for msb in 0..2 {
                let state = (next_state >> 1) | (msb << 5);
                let register = (state << 1) | (next_state & 1);
                let branch = &self.branch_table[register];
                let metric = self.metrics[state] + soft_a*branch[0] + soft_b*branch[1];
                if metric > best_metric {
                    best_metric = metric;
                    best_msb = msb;
                }
            }
            self.next_metrics[next_state] = best_metric;
            decision |= (best_msb as u64) << next_state;
        }
        self.decisions[step] = decision;

        // Renormalise so the path metrics stay bounded over long frames
        let max_metric = self.next_metrics.iter().fold(f32::NEG_INFINITY, |a, b| a.max(*b));
        for (x, y) in self.next_metrics.iter().zip(self.metrics.iter_mut()) {
            *y = (*x - max_metric).max(UNREACHABLE_METRIC);
        }
    }

    fn get_best_state(&self) -> usize {
        let mut best_state = 0;
        for (state, metric) in self.metrics.iter().enumerate() {
            if *metric > self.metrics[best_state] {
                best_state = state;
            }
        }
        best_state
    }

    #[inline(always)]
    fn get_predecessor(&self, state: usize, step: usize) -> usize {
        let msb = ((self.decisions[step] >> state) & 1) as usize;
        (state >> 1) | (msb << 5)
    }

    /// Walks back `depth` steps from `state` at `step` and returns the state reached.
    fn traceback(&self, mut state: usize, step: usize, depth: usize) -> usize {
        for k in 0..depth {
            state = self.get_predecessor(state, step-k);
        }
        state
    }
}

#[inline(always)]
fn soft_value(bit: u8) -> f32 {
    (bit as f32)*(-2.0) + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolutional_encoder::{convolutional_encode, depuncture, get_punctured_length, puncture};
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};
    use wifi_core::encoding::CodeRate;

    fn create_message(rng: &mut StdRng, nb_bits: usize) -> Vec<u8> {
        let mut bits: Vec<u8> = (0..nb_bits).map(|_| rng.gen_range(0..2)).collect();
        let nb_tail = 6.min(nb_bits);
        bits[nb_bits-nb_tail..].fill(0);
        bits
    }

    fn encode_soft(bits: &[u8]) -> Vec<f32> {
        let mut coded = vec![0u8; bits.len()*2];
        convolutional_encode(bits, &mut coded);
        coded.iter().map(|x| soft_value(*x)).collect()
    }

    #[test]
    fn test_noiseless_decode() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut decoder = ViterbiDecoder::default();
        for nb_bits in [6, 24, 29, 30, 31, 100, 822] {
            let bits = create_message(&mut rng, nb_bits);
            let soft = encode_soft(&bits);
            let mut decoded = vec![0u8; nb_bits];
            decoder.decode(&soft, &mut decoded);
            assert_eq!(decoded, bits, "length {}", nb_bits);
        }
    }

    #[test]
    fn test_corrects_sparse_errors() {
        let mut rng = StdRng::seed_from_u64(2);
        let bits = create_message(&mut rng, 400);
        let mut soft = encode_soft(&bits);
        // Flip isolated coded bits far apart from each other
        for i in (5..soft.len()).step_by(37) {
            soft[i] = -soft[i];
        }
        let mut decoded = vec![0u8; bits.len()];
        ViterbiDecoder::default().decode(&soft, &mut decoded);
        assert_eq!(decoded, bits);
    }

    #[test]
    fn test_punctured_decode_with_noise() {
        let mut rng = StdRng::seed_from_u64(3);
        let noise = Normal::new(0.0f32, 0.3).unwrap();
        let mut decoder = ViterbiDecoder::default();
        for rate in [CodeRate::Half, CodeRate::TwoThirds, CodeRate::ThreeQuarters] {
            let bits = create_message(&mut rng, 432);
            let soft = encode_soft(&bits);
            let mut punctured = vec![0.0; get_punctured_length(soft.len(), rate)];
            puncture(&soft, &mut punctured, rate);
            for x in punctured.iter_mut() {
                *x += noise.sample(&mut rng);
            }
            let mut restored = vec![0.0; soft.len()];
            depuncture(&punctured, &mut restored, rate);
            let mut decoded = vec![0u8; bits.len()];
            decoder.decode(&restored, &mut decoded);
            assert_eq!(decoded, bits, "{:?}", rate);
        }
    }
}
