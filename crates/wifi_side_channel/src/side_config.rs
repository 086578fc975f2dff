use crate::amplitude_mask::AmplitudeMask;
use crate::constellation_offset::{OffsetEncoder, OffsetSettings};
use crate::sector_varrate::{SectorEncoder, SectorParameters};
use crate::vlc::modulator::VlcModulator;
use crate::zero_subcarrier::create_transmit_mask;
use num::complex::Complex32;
use std::fmt;
use wifi_core::error::PhyResult;
use wifi_phy::stream_tags::StreamTag;

/// Which side channel rides on the primary frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SideChannelConfig {
    #[default]
    Disabled,
    /// Null the reference pattern of `nb_zeros` subcarriers per symbol.
    ZeroSubcarrier { nb_zeros: usize },
    FixedMask { mask: Vec<Complex32> },
    Offset(OffsetSettings),
    Sector { sectors: Vec<usize> },
    /// Replaces the primary mapper with a variable length coded constellation.
    Vlc { order: usize, nb_backup: usize },
}

impl SideChannelConfig {
    /// Checks the parameters without building any tables that are not needed.
    pub fn validate(&self) -> PhyResult<()> {
        match self {
            SideChannelConfig::Disabled => Ok(()),
            SideChannelConfig::ZeroSubcarrier { nb_zeros } => create_transmit_mask(*nb_zeros).map(|_| ()),
            SideChannelConfig::FixedMask { .. } => Ok(()),
            SideChannelConfig::Offset(settings) => settings.validate(),
            SideChannelConfig::Sector { sectors } => SectorParameters::new(sectors).map(|_| ()),
            SideChannelConfig::Vlc { order, nb_backup } => VlcModulator::new(*order, *nb_backup).map(|_| ()),
        }
    }

    /// Builds the block that modifies modulated primary symbols.
    /// VLC does not post process symbols so it gets a passthrough.
    pub fn create_transmitter(&self, payload: &[u8]) -> PhyResult<SideChannelTransmitter> {
        self.validate()?;
        let transmitter = match self {
            SideChannelConfig::Disabled | SideChannelConfig::Vlc { .. } => SideChannelTransmitter::Passthrough,
            SideChannelConfig::ZeroSubcarrier { nb_zeros } => {
                SideChannelTransmitter::Mask(AmplitudeMask::new(Some(create_transmit_mask(*nb_zeros)?)))
            },
            SideChannelConfig::FixedMask { mask } => SideChannelTransmitter::Mask(AmplitudeMask::new(Some(mask.clone()))),
            SideChannelConfig::Offset(settings) => SideChannelTransmitter::Offset(OffsetEncoder::new(*settings, payload)?),
            SideChannelConfig::Sector { sectors } => SideChannelTransmitter::Sector(SectorEncoder::new(sectors, payload)?),
        };
        Ok(transmitter)
    }
}

impl fmt::Display for SideChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideChannelConfig::Disabled => write!(f, "disabled"),
            SideChannelConfig::ZeroSubcarrier { nb_zeros } => write!(f, "zero subcarrier ({} zeros)", nb_zeros),
            SideChannelConfig::FixedMask { mask } => write!(f, "fixed mask ({} entries)", mask.len()),
            SideChannelConfig::Offset(settings) => {
                write!(f, "constellation offset ({}, alpha={})", settings.side_encoding, settings.alpha)
            },
            SideChannelConfig::Sector { sectors } => write!(f, "sector {:?}", sectors),
            SideChannelConfig::Vlc { order, nb_backup } => write!(f, "VLC (order={}, backup={})", order, nb_backup),
        }
    }
}

/// Transmit half of the side channels that act on modulated primary symbols.
pub enum SideChannelTransmitter {
    Passthrough,
    Mask(AmplitudeMask),
    Offset(OffsetEncoder),
    Sector(SectorEncoder),
}

impl SideChannelTransmitter {
    /// Modifies the symbols of one frame in place and returns how many were touched.
    pub fn apply(&self, tags: &[StreamTag], symbols: &mut [Complex32]) -> PhyResult<usize> {
        match self {
            SideChannelTransmitter::Passthrough => Ok(0),
            SideChannelTransmitter::Mask(mask) => mask.apply(tags, symbols),
            SideChannelTransmitter::Offset(encoder) => encoder.apply(tags, symbols),
            SideChannelTransmitter::Sector(encoder) => encoder.apply(tags, symbols),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_core::encoding::Encoding;
    use wifi_core::error::PhyError;
    use wifi_phy::stream_tags::FrameTags;

    #[test]
    fn test_validate() {
        assert_eq!(SideChannelConfig::Disabled.validate(), Ok(()));
        assert_eq!(SideChannelConfig::ZeroSubcarrier { nb_zeros: 3 }.validate(), Err(PhyError::UnsupportedZeroCount(3)));
        assert!(SideChannelConfig::Sector { sectors: vec![2, 9] }.validate().is_err());
        assert_eq!(
            SideChannelConfig::Vlc { order: 14, nb_backup: 5 }.validate(),
            Err(PhyError::InvalidMarkerBackup { nb_backup: 5, max: 4 }),
        );
        let offset = OffsetSettings { side_encoding: Encoding::Qam16_1_2, ..OffsetSettings::default() };
        assert_eq!(
            SideChannelConfig::Offset(offset).validate(),
            Err(PhyError::UnsupportedSideEncoding(Encoding::Qam16_1_2.into())),
        );
    }

    #[test]
    fn test_transmitter_passthrough_and_mask() {
        let tags = FrameTags { packet_len: 96, psdu_len: 30, encoding: Encoding::Qpsk1_2 }.to_tags();
        let original = vec![Complex32::new(1.0, 1.0); 96];

        let vlc = SideChannelConfig::Vlc { order: 20, nb_backup: 2 };
        let mut symbols = original.clone();
        assert_eq!(vlc.create_transmitter(&[]).unwrap().apply(&tags, &mut symbols), Ok(0));
        assert_eq!(symbols, original);

        let zero = SideChannelConfig::ZeroSubcarrier { nb_zeros: 1 };
        let mut symbols = original.clone();
        assert_eq!(zero.create_transmitter(&[]).unwrap().apply(&tags, &mut symbols), Ok(96));
        assert_eq!(symbols[2], Complex32::default());
        assert_eq!(symbols[48+3], Complex32::default());
        assert_eq!(symbols.iter().filter(|x| x.norm_sqr() == 0.0).count(), 2);
    }
}
