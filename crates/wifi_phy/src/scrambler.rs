use wifi_core::tx_parameters::{TxParameters, NB_TAIL_BITS};

/// Seed used by the transmitter for every frame.
pub const TX_SCRAMBLER_SEED: u8 = 23;

/// Length 127 frame synchronous scrambler with generator x^7 + x^4 + 1.
#[derive(Debug, Clone, Copy)]
pub struct Scrambler {
    state: u8,
}

impl Scrambler {
    pub fn new(seed: u8) -> Self {
        Self { state: seed & 0x7F }
    }

    /// Recovers the scrambler state from the first 7 bits of a frame whose SERVICE field starts with zeros.
    pub fn from_received_bits(bits: &[u8]) -> Self {
        assert!(bits.len() >= 7, "Need at least 7 bits to recover scrambler state but got {}", bits.len());
        let state = bits[..7]
            .iter()
            .enumerate()
            .fold(0u8, |state, (i, bit)| state | ((bit & 1) << (6-i)));
        Self { state }
    }

    #[inline(always)]
    pub fn next_bit(&mut self) -> u8 {
        let feedback = ((self.state >> 6) ^ (self.state >> 3)) & 1;
        self.state = ((self.state << 1) & 0x7E) | feedback;
        feedback
    }

    /// Xors each bit with the scrambler sequence in place.
    pub fn apply(&mut self, bits: &mut [u8]) {
        for bit in bits.iter_mut() {
            *bit ^= self.next_bit();
        }
    }
}

/// Scrambles the DATA field with the transmitter seed and zeroes the 6 tail bits afterwards.
pub fn scramble_data_field(bits: &mut [u8], tx: &TxParameters) {
    assert!(bits.len() == tx.nb_data_bits, "Data field has {} bits but expected {}", bits.len(), tx.nb_data_bits);
    Scrambler::new(TX_SCRAMBLER_SEED).apply(bits);
    reset_tail_bits(bits, tx);
}

/// Clause 17.3.5.3 - The tail bits are replaced by zeros after scrambling so the encoder returns to state 0.
pub fn reset_tail_bits(bits: &mut [u8], tx: &TxParameters) {
    let tail_end = tx.tail_end();
    bits[tail_end-NB_TAIL_BITS..tail_end].fill(0);
}

/// Descrambles decoded bits without knowing the seed.
/// The first 7 output bits belong to the SERVICE field and are written as zeros.
pub fn descramble(bits_in: &[u8], bits_out: &mut [u8]) {
    assert!(bits_in.len() == bits_out.len(), "Mismatching buffer lengths {} != {}", bits_in.len(), bits_out.len());
    let mut scrambler = Scrambler::from_received_bits(bits_in);
    bits_out[..7].fill(0);
    for (x, y) in bits_in.iter().zip(bits_out.iter_mut()).skip(7) {
        *y = x ^ scrambler.next_bit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_core::encoding::Encoding;
    use wifi_core::ofdm_parameters::OfdmParameters;

    #[test]
    fn test_sequence_period_is_127() {
        let mut scrambler = Scrambler::new(0x7F);
        let sequence: Vec<u8> = (0..254).map(|_| scrambler.next_bit()).collect();
        assert_eq!(&sequence[..127], &sequence[127..]);
        // Clause 17.3.5.5 - all ones initial state produces 00001110 11110010 ...
        assert_eq!(&sequence[..16], &[0,0,0,0,1,1,1,0, 1,1,1,1,0,0,1,0]);
    }

    #[test]
    fn test_blind_descramble() {
        let tx = TxParameters::new(&OfdmParameters::new(Encoding::Qpsk1_2), 20);
        let mut bits: Vec<u8> = (0..tx.nb_data_bits).map(|i| ((i*7 + i/3) % 2) as u8).collect();
        bits[..16].fill(0);
        let original = bits.clone();
        Scrambler::new(TX_SCRAMBLER_SEED).apply(&mut bits);

        let mut recovered = vec![0u8; tx.nb_data_bits];
        descramble(&bits, &mut recovered);
        assert_eq!(recovered, original);
    }

    #[test]
    fn test_tail_bits_are_zeroed() {
        let tx = TxParameters::new(&OfdmParameters::new(Encoding::Bpsk1_2), 100);
        let mut bits = vec![1u8; tx.nb_data_bits];
        scramble_data_field(&mut bits, &tx);
        assert!(bits[816..822].iter().all(|x| *x == 0));
    }
}
