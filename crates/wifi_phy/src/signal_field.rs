use crate::convolutional_encoder::convolutional_encode;
use crate::interleaver::Interleaver;
use crate::symbol_mapper::demodulate_hard;
use crate::viterbi_decoder::ViterbiDecoder;
use num::complex::Complex32;
use wifi_core::constellation::Constellation;
use wifi_core::encoding::Encoding;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::OfdmParameters;

pub const NB_SIGNAL_BITS: usize = 24;
pub const NB_SIGNAL_CODED_BITS: usize = 48;
const MAX_LENGTH: usize = 0x0FFF;

/// Decoded contents of the SIGNAL field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalField {
    pub encoding: Encoding,
    pub psdu_len: usize,
    /// The reserved bit, which is set to mark frames that may carry a side channel.
    pub side_flag: bool,
}

/// Builds the 24 bit SIGNAL field.
///
/// # Diagram
/// ```text
/// | RATE (4) | R (1) | LENGTH (12) | P (1) | TAIL (6) |
/// ```
pub fn generate_signal_bits(ofdm: &OfdmParameters, psdu_len: usize, bits_out: &mut [u8]) {
    assert!(bits_out.len() == NB_SIGNAL_BITS, "SIGNAL field has {} bits but got {}", NB_SIGNAL_BITS, bits_out.len());
    assert!(psdu_len <= MAX_LENGTH, "PSDU length {} does not fit in 12 bits", psdu_len);
    assert!(ofdm.encoding.is_primary(), "{} cannot be signalled", ofdm.encoding);

    bits_out.fill(0);
    // Rate is written starting from its most significant bit
    for i in 0..4 {
        bits_out[i] = (ofdm.rate_field >> (3-i)) & 1;
    }
    bits_out[4] = 1;
    for i in 0..12 {
        bits_out[5+i] = ((psdu_len >> i) & 1) as u8;
    }
    bits_out[17] = bits_out[..17].iter().fold(0, |acc, bit| acc ^ bit);
}

/// SIGNAL field coded with BPSK 1/2 and interleaved, ready for mapping onto one OFDM symbol.
/// Scrambling is not applied to the SIGNAL field.
pub fn generate_signal_field(ofdm: &OfdmParameters, psdu_len: usize, bits_out: &mut [u8]) {
    assert!(bits_out.len() == NB_SIGNAL_CODED_BITS, "Coded SIGNAL field has {} bits but got {}", NB_SIGNAL_CODED_BITS, bits_out.len());
    let mut bits = [0u8; NB_SIGNAL_BITS];
    let mut coded_bits = [0u8; NB_SIGNAL_CODED_BITS];
    generate_signal_bits(ofdm, psdu_len, &mut bits);
    convolutional_encode(&bits, &mut coded_bits);
    Interleaver::new(NB_SIGNAL_CODED_BITS, 1).interleave(&coded_bits, bits_out);
}

/// Recovers the encoding and length from the 24 decoded SIGNAL bits.
pub fn parse_signal_bits(bits: &[u8]) -> PhyResult<SignalField> {
    assert!(bits.len() == NB_SIGNAL_BITS, "SIGNAL field has {} bits but got {}", NB_SIGNAL_BITS, bits.len());
    let parity = bits[..18].iter().fold(0, |acc, bit| acc ^ bit);
    if parity != 0 {
        return Err(PhyError::SignalParity);
    }

    let rate_field = bits[..4].iter().fold(0u8, |acc, bit| (acc << 1) | bit);
    let ofdm = OfdmParameters::from_rate_field(rate_field).ok_or(PhyError::UnknownRateField(rate_field))?;
    let psdu_len = bits[5..17]
        .iter()
        .enumerate()
        .fold(0usize, |acc, (i, bit)| acc | ((*bit as usize) << i));

    Ok(SignalField {
        encoding: ofdm.encoding,
        psdu_len,
        side_flag: bits[4] == 1,
    })
}

/// Demodulates and decodes a received SIGNAL symbol made of 48 BPSK subcarriers.
pub fn parse_signal_field(symbols: &[Complex32], viterbi: &mut ViterbiDecoder) -> PhyResult<SignalField> {
    assert!(symbols.len() == NB_SIGNAL_CODED_BITS, "SIGNAL symbol has {} subcarriers but got {}", NB_SIGNAL_CODED_BITS, symbols.len());
    let constellation = Constellation::new(Encoding::Bpsk1_2);
    let mut soft = [0.0f32; NB_SIGNAL_CODED_BITS];
    let mut deinterleaved = [0.0f32; NB_SIGNAL_CODED_BITS];
    demodulate_hard(&constellation, symbols, &mut soft);
    Interleaver::new(NB_SIGNAL_CODED_BITS, 1).deinterleave(&soft, &mut deinterleaved);

    let mut bits = [0u8; NB_SIGNAL_BITS];
    viterbi.decode(&deinterleaved, &mut bits);
    parse_signal_bits(&bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_mapper::modulate;

    fn to_symbols(coded_bits: &[u8]) -> Vec<Complex32> {
        let constellation = Constellation::new(Encoding::Bpsk1_2);
        let mut symbols = vec![Complex32::default(); coded_bits.len()];
        modulate(&constellation, coded_bits, &mut symbols);
        symbols
    }

    #[test]
    fn test_bit_layout() {
        let mut bits = [0u8; NB_SIGNAL_BITS];
        // 0x0D = 1101, length 100 = 0b000001100100
        generate_signal_bits(&OfdmParameters::new(Encoding::Bpsk1_2), 100, &mut bits);
        assert_eq!(&bits[..5], &[1, 1, 0, 1, 1]);
        assert_eq!(&bits[5..17], &[0, 0, 1, 0, 0, 1, 1, 0, 0, 0, 0, 0]);
        // 3 rate ones, reserved bit and 3 length ones gives odd parity
        assert_eq!(bits[17], 1);
        assert!(bits[18..].iter().all(|x| *x == 0));
    }

    #[test]
    fn test_decode_every_rate() {
        let mut viterbi = ViterbiDecoder::default();
        for encoding in Encoding::PRIMARY {
            for psdu_len in [1, 100, 1528, 4095] {
                let mut coded = [0u8; NB_SIGNAL_CODED_BITS];
                generate_signal_field(&OfdmParameters::new(encoding), psdu_len, &mut coded);
                let signal = parse_signal_field(&to_symbols(&coded), &mut viterbi).unwrap();
                assert_eq!(signal, SignalField { encoding, psdu_len, side_flag: true });
            }
        }
    }

    #[test]
    fn test_parity_failure() {
        let mut bits = [0u8; NB_SIGNAL_BITS];
        generate_signal_bits(&OfdmParameters::new(Encoding::Qam16_1_2), 60, &mut bits);
        bits[7] ^= 1;
        assert_eq!(parse_signal_bits(&bits), Err(PhyError::SignalParity));
    }

    #[test]
    fn test_unknown_rate() {
        let mut bits = [0u8; NB_SIGNAL_BITS];
        // Rate 0000 with even parity
        bits[5] = 1;
        bits[6] = 1;
        assert_eq!(parse_signal_bits(&bits), Err(PhyError::UnknownRateField(0)));
    }
}
