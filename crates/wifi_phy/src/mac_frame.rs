use wifi_core::error::{PhyError, PhyResult};

pub const MAC_HEADER_LENGTH: usize = 24;
pub const FCS_LENGTH: usize = 4;
pub const MAX_MSDU_LENGTH: usize = 1500;
/// CRC-32 of any frame followed by its own little endian CRC-32.
pub const FCS_RESIDUE: u32 = 0x2144DF1C;
/// Frame control for a data frame with no flags set.
pub const FRAME_CONTROL_DATA: u16 = 0x0008;

pub type MacAddress = [u8; 6];

#[derive(Debug, Clone)]
pub struct MacSettings {
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
    pub bss_mac: MacAddress,
    /// Append the frame check sequence here instead of leaving it to the mapper.
    pub include_fcs: bool,
    /// 12 bit sequence number placed in every header. Retransmissions are not modelled so it stays fixed.
    pub sequence_number: u16,
}

impl Default for MacSettings {
    fn default() -> Self {
        Self {
            src_mac: [0x23, 0x23, 0x23, 0x23, 0x23, 0x23],
            dst_mac: [0x42, 0x42, 0x42, 0x42, 0x42, 0x42],
            bss_mac: [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            include_fcs: true,
            sequence_number: 0,
        }
    }
}

/// A PSDU handed from the MAC to the PHY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacFrame {
    pub psdu: Vec<u8>,
    /// Whether the last 4 bytes of the PSDU are already the frame check sequence.
    pub crc_included: bool,
}

/// Wraps application payloads in 802.11 data frame headers.
///
/// # Diagram
/// ```text
/// | FC (2) | DURATION (2) | ADDR1 (6) | ADDR2 (6) | ADDR3 (6) | SEQ (2) | MSDU | FCS (4) |
/// ```
pub struct MacFramer {
    pub settings: MacSettings,
}

impl MacFramer {
    pub fn new(settings: MacSettings) -> Self {
        Self { settings }
    }

    /// Builds the framer from addresses of unchecked length.
    pub fn from_addresses(src_mac: &[u8], dst_mac: &[u8], bss_mac: &[u8], include_fcs: bool) -> PhyResult<Self> {
        let settings = MacSettings {
            src_mac: parse_mac_address(src_mac)?,
            dst_mac: parse_mac_address(dst_mac)?,
            bss_mac: parse_mac_address(bss_mac)?,
            include_fcs,
            ..MacSettings::default()
        };
        Ok(Self::new(settings))
    }

    /// Application payload in, PSDU out.
    pub fn frame(&self, msdu: &[u8]) -> PhyResult<MacFrame> {
        if msdu.len() > MAX_MSDU_LENGTH {
            return Err(PhyError::PayloadTooLarge { length: msdu.len(), max: MAX_MSDU_LENGTH });
        }

        let mut psdu = Vec::with_capacity(MAC_HEADER_LENGTH + msdu.len() + FCS_LENGTH);
        psdu.extend_from_slice(&FRAME_CONTROL_DATA.to_le_bytes());
        psdu.extend_from_slice(&0u16.to_le_bytes());
        psdu.extend_from_slice(&self.settings.dst_mac);
        psdu.extend_from_slice(&self.settings.src_mac);
        psdu.extend_from_slice(&self.settings.bss_mac);
        // Lower 4 bits are the fragment number
        let sequence_control = (self.settings.sequence_number & 0x0FFF) << 4;
        psdu.extend_from_slice(&sequence_control.to_le_bytes());
        psdu.extend_from_slice(msdu);

        if self.settings.include_fcs {
            append_fcs(&mut psdu);
        }

        Ok(MacFrame {
            psdu,
            crc_included: self.settings.include_fcs,
        })
    }

    /// Received MPDU in, application payload out.
    /// Returns None when the frame is shorter than a MAC header.
    pub fn strip_header<'a>(&self, mpdu: &'a [u8]) -> Option<&'a [u8]> {
        mpdu.get(MAC_HEADER_LENGTH..)
    }
}

pub fn parse_mac_address(address: &[u8]) -> PhyResult<MacAddress> {
    address
        .try_into()
        .map_err(|_| PhyError::InvalidMacAddress(address.len()))
}

pub fn append_fcs(psdu: &mut Vec<u8>) {
    let fcs = crc32fast::hash(psdu);
    psdu.extend_from_slice(&fcs.to_le_bytes());
}

/// Checks a PSDU that ends with its frame check sequence.
pub fn check_fcs(psdu: &[u8]) -> PhyResult<()> {
    let checksum = crc32fast::hash(psdu);
    if checksum != FCS_RESIDUE {
        return Err(PhyError::ChecksumMismatch { checksum });
    }
    Ok(())
}

/// Reads the 12 bit sequence number from a PSDU.
pub fn get_sequence_number(psdu: &[u8]) -> Option<u16> {
    let bytes = psdu.get(22..24)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]) >> 4)
}
