use wifi_core::encoding::CodeRate;

/// Constraint length of the industry standard K=7 code.
pub const CONSTRAINT_LENGTH: usize = 7;
/// Generator polynomials g0=133 and g1=171 (octal) as taps on a shift register holding the newest bit at bit 0.
pub const GENERATOR_A: u8 = 0o155;
pub const GENERATOR_B: u8 = 0o117;

#[inline(always)]
pub fn parity(x: u8) -> u8 {
    (x.count_ones() & 1) as u8
}

/// Rate 1/2 convolutional encoder starting from the all zero state.
/// Each input bit produces the pair (A, B).
pub fn convolutional_encode(bits_in: &[u8], bits_out: &mut [u8]) {
    assert!(bits_in.len()*2 == bits_out.len(), "Rate 1/2 encoder needs {} output bits but got {}", bits_in.len()*2, bits_out.len());
    let mut state: u8 = 0;
    for (bit, pair) in bits_in.iter().zip(bits_out.chunks_exact_mut(2)) {
        state = ((state << 1) & 0x7E) | (bit & 1);
        pair[0] = parity(state & GENERATOR_A);
        pair[1] = parity(state & GENERATOR_B);
    }
}

/// Number of bits left after puncturing a rate 1/2 stream.
pub fn get_punctured_length(nb_coded_bits: usize, rate: CodeRate) -> usize {
    let pattern = rate.puncture_pattern();
    (0..nb_coded_bits).filter(|i| pattern[i % pattern.len()]).count()
}

/// Drops the stolen bits from a rate 1/2 stream.
pub fn puncture<T: Copy>(bits_in: &[T], bits_out: &mut [T], rate: CodeRate) {
    let pattern = rate.puncture_pattern();
    let mut total_out = 0;
    for (i, bit) in bits_in.iter().enumerate() {
        if pattern[i % pattern.len()] {
            bits_out[total_out] = *bit;
            total_out += 1;
        }
    }
    assert!(total_out == bits_out.len(), "Punctured {} bits into a buffer of {} bits", total_out, bits_out.len());
}

/// Reinserts the stolen bits as erasures with a soft value of zero.
/// Returns the number of punctured bits that were consumed.
pub fn depuncture(soft_in: &[f32], soft_out: &mut [f32], rate: CodeRate) -> usize {
    let pattern = rate.puncture_pattern();
    let mut total_read = 0;
    for (i, y) in soft_out.iter_mut().enumerate() {
        *y = if pattern[i % pattern.len()] && total_read < soft_in.len() {
            total_read += 1;
            soft_in[total_read-1]
        } else {
            0.0
        };
    }
    total_read
}
