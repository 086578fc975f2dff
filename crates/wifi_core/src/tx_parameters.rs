use crate::error::{PhyError, PhyResult};
use crate::ofdm_parameters::OfdmParameters;

/// Number of bits in the SERVICE field at the start of the DATA field.
pub const NB_SERVICE_BITS: usize = 16;
/// Number of zero bits that flush the convolutional encoder.
pub const NB_TAIL_BITS: usize = 6;

/// Sizes of the DATA field for a PSDU of a given length.
///
/// # Diagram
/// ```text
/// | SERVICE (16) | PSDU (8*psdu_size) | TAIL (6) | PAD (nb_pad_bits) |
/// |<------------------------- nb_data_bits -------------------------->|
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParameters {
    /// Number of bytes in the PSDU including the frame check sequence.
    pub psdu_size: usize,
    /// Number of OFDM symbols in the DATA field.
    pub nb_symbols: usize,
    /// Number of data bits before convolutional coding.
    pub nb_data_bits: usize,
    /// Number of zero bits appended after the tail to fill the last symbol.
    pub nb_pad_bits: usize,
    /// Number of coded bits after puncturing.
    pub nb_encoded_bits: usize,
}

impl TxParameters {
    pub fn new(ofdm: &OfdmParameters, psdu_size: usize) -> Self {
        // Clause 17.3.5.4 - Pad bits
        let nb_payload_bits = NB_SERVICE_BITS + 8*psdu_size + NB_TAIL_BITS;
        let nb_symbols = nb_payload_bits.div_ceil(ofdm.nb_dbps);
        let nb_data_bits = nb_symbols*ofdm.nb_dbps;
        let nb_pad_bits = nb_data_bits - nb_payload_bits;
        let nb_encoded_bits = nb_symbols*ofdm.nb_cbps;

        Self {
            psdu_size,
            nb_symbols,
            nb_data_bits,
            nb_pad_bits,
            nb_encoded_bits,
        }
    }

    /// Index one past the last tail bit, which is also where padding starts.
    pub fn tail_end(&self) -> usize {
        self.nb_data_bits - self.nb_pad_bits
    }

    /// Number of constellation points in the frame.
    pub fn nb_samples(&self) -> usize {
        self.nb_symbols*crate::ofdm_parameters::NB_DATA_CARRIERS
    }
}

/// Upper bounds on the frames the transmitter and receiver will handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_symbols: usize,
    pub max_encoded_bits: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_symbols: 520,
            max_encoded_bits: 1550*8*2,
        }
    }
}

impl FrameLimits {
    /// Rejects frames that exceed either limit.
    pub fn check(&self, tx: &TxParameters) -> PhyResult<()> {
        if tx.nb_symbols > self.max_symbols || tx.nb_encoded_bits > self.max_encoded_bits {
            return Err(PhyError::FrameTooLarge {
                nb_symbols: tx.nb_symbols,
                nb_encoded_bits: tx.nb_encoded_bits,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;

    #[test]
    fn test_bpsk_half_rate_100_bytes() {
        let tx = TxParameters::new(&OfdmParameters::new(Encoding::Bpsk1_2), 100);
        assert_eq!(tx.nb_symbols, 35);
        assert_eq!(tx.nb_data_bits, 840);
        assert_eq!(tx.nb_pad_bits, 18);
        assert_eq!(tx.nb_encoded_bits, 1680);
        assert_eq!(tx.tail_end(), 822);
    }

    #[test]
    fn test_padding_fills_last_symbol() {
        for encoding in Encoding::PRIMARY {
            let ofdm = OfdmParameters::new(encoding);
            for psdu_size in [1, 14, 28, 100, 1500] {
                let tx = TxParameters::new(&ofdm, psdu_size);
                assert_eq!(tx.nb_data_bits % ofdm.nb_dbps, 0);
                assert!(tx.nb_pad_bits < ofdm.nb_dbps);
                assert_eq!(tx.nb_encoded_bits, tx.nb_symbols*ofdm.nb_bpsc*48);
            }
        }
    }

    #[test]
    fn test_frame_limits() {
        let limits = FrameLimits::default();
        let small = TxParameters::new(&OfdmParameters::new(Encoding::Qam64_3_4), 1500);
        assert!(limits.check(&small).is_ok());
        // BPSK 1/2 needs 2 coded bits per data bit which overflows the coded bit limit
        let large = TxParameters::new(&OfdmParameters::new(Encoding::Bpsk1_2), 1560);
        assert!(matches!(limits.check(&large), Err(PhyError::FrameTooLarge { .. })));
    }
}
