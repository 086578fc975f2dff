use crate::encoding::Encoding;

/// Number of data subcarriers in each OFDM symbol.
pub const NB_DATA_CARRIERS: usize = 48;

/// Describes the per symbol bit capacity of an encoding.
///
/// # Diagram
/// ```text
/// | Data bits (nb_dbps) | --> convolutional code + puncturing --> | Coded bits (nb_cbps) |
/// | Coded bits (nb_cbps) | --> 48 subcarriers * nb_bpsc
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfdmParameters {
    pub encoding: Encoding,
    /// Number of coded bits per subcarrier.
    pub nb_bpsc: usize,
    /// Number of coded bits per OFDM symbol.
    pub nb_cbps: usize,
    /// Number of data bits per OFDM symbol.
    pub nb_dbps: usize,
    /// Four rate bits transmitted in the SIGNAL field.
    pub rate_field: u8,
}

impl OfdmParameters {
    pub fn new(encoding: Encoding) -> Self {
        // Clause 17.3.2.3 - Modulation-dependent parameters
        let (nb_bpsc, nb_dbps, rate_field) = match encoding {
            Encoding::Bpsk1_2   => (1,  24, 0x0D),
            Encoding::Bpsk3_4   => (1,  36, 0x0F),
            Encoding::Qpsk1_2   => (2,  48, 0x05),
            Encoding::Qpsk3_4   => (2,  72, 0x07),
            Encoding::Qam16_1_2 => (4,  96, 0x09),
            Encoding::Qam16_3_4 => (4, 144, 0x0B),
            Encoding::Qam64_2_3 => (6, 192, 0x01),
            Encoding::Qam64_3_4 => (6, 216, 0x03),
            // NOTE: 8PSK never appears in a SIGNAL field so it has no rate bits
            Encoding::Psk8_1_2  => (3,  72, 0x00),
        };

        Self {
            encoding,
            nb_bpsc,
            nb_cbps: nb_bpsc*NB_DATA_CARRIERS,
            nb_dbps,
            rate_field,
        }
    }

    /// Looks up the primary encoding transmitted with these rate bits.
    pub fn from_rate_field(rate_field: u8) -> Option<Self> {
        Encoding::PRIMARY
            .iter()
            .map(|encoding| Self::new(*encoding))
            .find(|params| params.rate_field == rate_field)
    }
}
