use crate::error::{PhyError, PhyResult};
use std::fmt;

/// Modulation and coding scheme of an OFDM frame.
/// The numeric values are the ones carried by the `encoding` stream tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Encoding {
    Bpsk1_2 = 0,
    Bpsk3_4 = 1,
    Qpsk1_2 = 2,
    Qpsk3_4 = 3,
    Qam16_1_2 = 4,
    Qam16_3_4 = 5,
    Qam64_2_3 = 6,
    Qam64_3_4 = 7,
    /// Only used by the constellation offset side channel.
    Psk8_1_2 = 8,
}

/// Code rate of the punctured convolutional code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRate {
    Half,
    TwoThirds,
    ThreeQuarters,
}

impl Encoding {
    /// Encodings that can be used for the primary channel.
    pub const PRIMARY: [Encoding; 8] = [
        Encoding::Bpsk1_2,
        Encoding::Bpsk3_4,
        Encoding::Qpsk1_2,
        Encoding::Qpsk3_4,
        Encoding::Qam16_1_2,
        Encoding::Qam16_3_4,
        Encoding::Qam64_2_3,
        Encoding::Qam64_3_4,
    ];

    pub fn is_primary(&self) -> bool {
        !matches!(self, Encoding::Psk8_1_2)
    }

    pub fn code_rate(&self) -> CodeRate {
        match self {
            Encoding::Bpsk1_2 | Encoding::Qpsk1_2 | Encoding::Qam16_1_2 | Encoding::Psk8_1_2 => CodeRate::Half,
            Encoding::Qam64_2_3 => CodeRate::TwoThirds,
            Encoding::Bpsk3_4 | Encoding::Qpsk3_4 | Encoding::Qam16_3_4 | Encoding::Qam64_3_4 => CodeRate::ThreeQuarters,
        }
    }
}

impl TryFrom<u32> for Encoding {
    type Error = PhyError;

    fn try_from(value: u32) -> PhyResult<Self> {
        let encoding = match value {
            0 => Encoding::Bpsk1_2,
            1 => Encoding::Bpsk3_4,
            2 => Encoding::Qpsk1_2,
            3 => Encoding::Qpsk3_4,
            4 => Encoding::Qam16_1_2,
            5 => Encoding::Qam16_3_4,
            6 => Encoding::Qam64_2_3,
            7 => Encoding::Qam64_3_4,
            8 => Encoding::Psk8_1_2,
            _ => return Err(PhyError::UnknownEncoding(value)),
        };
        Ok(encoding)
    }
}

impl From<Encoding> for u32 {
    fn from(encoding: Encoding) -> u32 {
        encoding as u32
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Bpsk1_2 => "BPSK 1/2",
            Encoding::Bpsk3_4 => "BPSK 3/4",
            Encoding::Qpsk1_2 => "QPSK 1/2",
            Encoding::Qpsk3_4 => "QPSK 3/4",
            Encoding::Qam16_1_2 => "16QAM 1/2",
            Encoding::Qam16_3_4 => "16QAM 3/4",
            Encoding::Qam64_2_3 => "64QAM 2/3",
            Encoding::Qam64_3_4 => "64QAM 3/4",
            Encoding::Psk8_1_2 => "8PSK 1/2",
        };
        f.write_str(name)
    }
}

impl CodeRate {
    /// Which bits of the rate 1/2 mother code are transmitted, repeating with the pattern length.
    pub fn puncture_pattern(&self) -> &'static [bool] {
        // Clause 17.3.5.6 - Convolutional encoder
        // Stolen bits are dropped from the A0 B0 A1 B1 ... stream
        match self {
            CodeRate::Half          => &[true, true],
            CodeRate::TwoThirds     => &[true, true, true, false],
            CodeRate::ThreeQuarters => &[true, true, true, false, false, true],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_tag_values() {
        for (i, encoding) in Encoding::PRIMARY.iter().enumerate() {
            assert_eq!(u32::from(*encoding), i as u32);
            assert_eq!(Encoding::try_from(i as u32), Ok(*encoding));
        }
        assert_eq!(Encoding::try_from(8), Ok(Encoding::Psk8_1_2));
        assert_eq!(Encoding::try_from(9), Err(PhyError::UnknownEncoding(9)));
    }

    #[test]
    fn test_puncture_pattern_rates() {
        for (rate, kept, total) in [(CodeRate::Half, 2, 2), (CodeRate::TwoThirds, 3, 4), (CodeRate::ThreeQuarters, 4, 6)] {
            let pattern = rate.puncture_pattern();
            assert_eq!(pattern.len(), total);
            assert_eq!(pattern.iter().filter(|x| **x).count(), kept);
        }
    }
}
